//! Cross-frame source identity.
//!
//! A strategy turns the filtered source lists of every exposure into tracks,
//! one per source of the first exposure, each holding exactly one detection
//! per exposure. Track ids are 1-based and follow the first exposure's rank.
//!
//! [`RankCorrespondence`] pairs the i-th brightest source of every frame. It
//! needs no spatial information, and it silently splices unrelated stars
//! together when brightness ranks swap between frames. The jump check in
//! [`find_jumps`] exists to make that visible. The two spatial strategies
//! match by distance instead and fail loudly when a source cannot be found.

use serde::{Deserialize, Serialize};

use crate::dao_star_detection::DetectedSource;
use crate::error::{DriftError, Result};
use crate::frame_series::FrameSources;

#[derive(Debug, Clone, Serialize)]
pub struct SourceTrack {
    /// 1-based track id
    pub id: usize,
    /// One detection per exposure, in capture order
    pub detections: Vec<DetectedSource>,
}

impl SourceTrack {
    /// Pixel displacement between each consecutive pair of detections.
    pub fn steps(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.detections
            .windows(2)
            .map(|pair| (pair[1].x - pair[0].x, pair[1].y - pair[0].y))
    }
}

pub trait CorrespondenceStrategy {
    fn name(&self) -> &'static str;

    fn resolve(&self, frames: &[FrameSources]) -> Result<Vec<SourceTrack>>;
}

/// Serializable strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum CorrespondenceConfig {
    Rank,
    NearestCentroid { max_distance: f64 },
    MotionPredicted { max_distance: f64 },
}

impl Default for CorrespondenceConfig {
    fn default() -> Self {
        CorrespondenceConfig::Rank
    }
}

impl CorrespondenceConfig {
    pub fn build(&self) -> Result<Box<dyn CorrespondenceStrategy>> {
        match *self {
            CorrespondenceConfig::Rank => Ok(Box::new(RankCorrespondence)),
            CorrespondenceConfig::NearestCentroid { max_distance } => {
                validate_distance(max_distance)?;
                Ok(Box::new(NearestCentroidCorrespondence { max_distance }))
            }
            CorrespondenceConfig::MotionPredicted { max_distance } => {
                validate_distance(max_distance)?;
                Ok(Box::new(MotionPredictedCorrespondence { max_distance }))
            }
        }
    }
}

fn validate_distance(max_distance: f64) -> Result<()> {
    if !max_distance.is_finite() || max_distance <= 0.0 {
        return Err(DriftError::InvalidParameter {
            name: "max_distance",
            reason: format!("must be positive, got {}", max_distance),
        });
    }
    Ok(())
}

/// Tracks are fixed by the first frame; every later frame must hold at least
/// that many sources.
fn track_count(frames: &[FrameSources]) -> Result<usize> {
    let first = frames.first().ok_or(DriftError::NoExposures)?;
    let required = first.sources.len();
    if required == 0 {
        return Err(DriftError::EmptyDetection {
            exposure: first.capture,
        });
    }

    for frame in &frames[1..] {
        if frame.sources.len() < required {
            return Err(DriftError::InsufficientSources {
                exposure: frame.capture,
                found: frame.sources.len(),
                required,
            });
        }
    }
    Ok(required)
}

fn seed_tracks(first: &FrameSources, capacity: usize) -> Vec<SourceTrack> {
    first
        .sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            let mut detections = Vec::with_capacity(capacity);
            detections.push(source.clone());
            SourceTrack { id: i + 1, detections }
        })
        .collect()
}

/// Identity by brightness rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct RankCorrespondence;

impl CorrespondenceStrategy for RankCorrespondence {
    fn name(&self) -> &'static str {
        "rank"
    }

    fn resolve(&self, frames: &[FrameSources]) -> Result<Vec<SourceTrack>> {
        let count = track_count(frames)?;
        let mut tracks = seed_tracks(&frames[0], frames.len());

        for frame in &frames[1..] {
            for (track, source) in tracks.iter_mut().zip(frame.sources.iter().take(count)) {
                track.detections.push(source.clone());
            }
        }
        Ok(tracks)
    }
}

/// Identity by proximity to the track's last position.
#[derive(Debug, Clone, Copy)]
pub struct NearestCentroidCorrespondence {
    pub max_distance: f64,
}

impl CorrespondenceStrategy for NearestCentroidCorrespondence {
    fn name(&self) -> &'static str {
        "nearest"
    }

    fn resolve(&self, frames: &[FrameSources]) -> Result<Vec<SourceTrack>> {
        resolve_spatial(frames, self.max_distance, |track| {
            let last = &track.detections[track.detections.len() - 1];
            (last.x, last.y)
        })
    }
}

/// Identity by proximity to a constant-velocity prediction from the last
/// two positions. Falls back to the last position for the second frame.
#[derive(Debug, Clone, Copy)]
pub struct MotionPredictedCorrespondence {
    pub max_distance: f64,
}

impl CorrespondenceStrategy for MotionPredictedCorrespondence {
    fn name(&self) -> &'static str {
        "predicted"
    }

    fn resolve(&self, frames: &[FrameSources]) -> Result<Vec<SourceTrack>> {
        resolve_spatial(frames, self.max_distance, |track| {
            let n = track.detections.len();
            let last = &track.detections[n - 1];
            if n < 2 {
                return (last.x, last.y);
            }
            let prev = &track.detections[n - 2];
            (2.0 * last.x - prev.x, 2.0 * last.y - prev.y)
        })
    }
}

fn resolve_spatial<F>(frames: &[FrameSources], max_distance: f64, predict: F) -> Result<Vec<SourceTrack>>
where
    F: Fn(&SourceTrack) -> (f64, f64),
{
    track_count(frames)?;
    let mut tracks = seed_tracks(&frames[0], frames.len());

    for frame in &frames[1..] {
        let predictions: Vec<(f64, f64)> = tracks.iter().map(&predict).collect();
        let assignment = assign_nearest(&predictions, &frame.sources, max_distance)
            .map_err(|track_index| DriftError::TrackLost {
                track: track_index + 1,
                exposure: frame.capture,
                max_distance,
            })?;

        for (track, source_index) in tracks.iter_mut().zip(assignment) {
            track.detections.push(frame.sources[source_index].clone());
        }
    }
    Ok(tracks)
}

/// One-to-one assignment of sources to predictions. Shortest pairs are taken
/// first; predictions left over are then placed through augmenting paths, so
/// a complete assignment is found whenever one exists within `max_distance`.
/// Returns the source index for each prediction, or the index of the first
/// prediction that cannot be placed.
fn assign_nearest(
    predictions: &[(f64, f64)],
    sources: &[DetectedSource],
    max_distance: f64,
) -> std::result::Result<Vec<usize>, usize> {
    let max_sq = max_distance * max_distance;

    let mut pairs = Vec::new();
    let mut candidates: Vec<Vec<usize>> = Vec::with_capacity(predictions.len());
    for (t, &(px, py)) in predictions.iter().enumerate() {
        let mut near: Vec<(f64, usize)> = sources
            .iter()
            .enumerate()
            .map(|(s, source)| ((source.x - px).powi(2) + (source.y - py).powi(2), s))
            .filter(|&(d2, _)| d2 <= max_sq)
            .collect();
        near.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        pairs.extend(near.iter().map(|&(d2, s)| (d2, t, s)));
        candidates.push(near.into_iter().map(|(_, s)| s).collect());
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut assigned: Vec<Option<usize>> = vec![None; predictions.len()];
    let mut owner: Vec<Option<usize>> = vec![None; sources.len()];
    for (_, t, s) in pairs {
        if assigned[t].is_none() && owner[s].is_none() {
            assigned[t] = Some(s);
            owner[s] = Some(t);
        }
    }

    for t in 0..predictions.len() {
        if assigned[t].is_none() {
            let mut visited = vec![false; sources.len()];
            if !augment(t, &candidates, &mut assigned, &mut owner, &mut visited) {
                return Err(t);
            }
        }
    }

    assigned
        .into_iter()
        .enumerate()
        .map(|(t, s)| s.ok_or(t))
        .collect()
}

fn augment(
    t: usize,
    candidates: &[Vec<usize>],
    assigned: &mut [Option<usize>],
    owner: &mut [Option<usize>],
    visited: &mut [bool],
) -> bool {
    for &s in &candidates[t] {
        if visited[s] {
            continue;
        }
        visited[s] = true;

        let free = match owner[s] {
            None => true,
            Some(other) => augment(other, candidates, assigned, owner, visited),
        };
        if free {
            owner[s] = Some(t);
            assigned[t] = Some(s);
            return true;
        }
    }
    false
}

/// A single frame-to-frame step longer than expected for a tracked star.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackWarning {
    pub track: usize,
    /// Capture at which the jump lands
    pub capture: usize,
    pub step_px: f64,
}

/// Steps longer than `limit_px`; a likely sign that two stars swapped ranks.
pub fn find_jumps(tracks: &[SourceTrack], frames: &[FrameSources], limit_px: f64) -> Vec<TrackWarning> {
    let mut warnings = Vec::new();
    for track in tracks {
        for (j, (dx, dy)) in track.steps().enumerate() {
            let step_px = (dx * dx + dy * dy).sqrt();
            if step_px > limit_px {
                warnings.push(TrackWarning {
                    track: track.id,
                    capture: frames.get(j + 1).map_or(j + 2, |f| f.capture),
                    step_px,
                });
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn source(x: f64, y: f64, peak: f64) -> DetectedSource {
        DetectedSource {
            rank: 0,
            x,
            y,
            peak,
            background: 300.0,
            flux: peak,
            sharpness: 0.5,
            roundness: 0.0,
        }
    }

    fn frame(capture: usize, positions: &[(f64, f64, f64)]) -> FrameSources {
        let mut sources: Vec<DetectedSource> =
            positions.iter().map(|&(x, y, p)| source(x, y, p)).collect();
        sources.sort_by(|a, b| b.peak.total_cmp(&a.peak));
        for (i, s) in sources.iter_mut().enumerate() {
            s.rank = i + 1;
        }
        FrameSources {
            capture,
            timestamp: None,
            threshold: 300.0,
            median: 300.0,
            detected: sources.len(),
            sources,
        }
    }

    #[test]
    fn test_rank_pairs_by_position_in_list() {
        let frames = vec![
            frame(1, &[(10.0, 10.0, 9000.0), (50.0, 50.0, 5000.0)]),
            frame(2, &[(12.0, 10.0, 9000.0), (52.0, 50.0, 5000.0), (80.0, 80.0, 4000.0)]),
        ];
        let tracks = RankCorrespondence.resolve(&frames).unwrap();

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id, 1);
        assert_eq!(tracks[1].id, 2);
        assert!(tracks.iter().all(|t| t.detections.len() == 2));
        assert_eq!(tracks[0].detections[1].x, 12.0);
        assert_eq!(tracks[1].detections[1].x, 52.0);
    }

    #[test]
    fn test_rank_insufficient_sources() {
        let frames = vec![
            frame(1, &[(10.0, 10.0, 9000.0), (50.0, 50.0, 5000.0)]),
            frame(2, &[(12.0, 10.0, 9000.0), (52.0, 50.0, 5000.0)]),
            frame(3, &[(14.0, 10.0, 9000.0)]),
        ];
        let err = RankCorrespondence.resolve(&frames).unwrap_err();
        assert_eq!(
            err,
            DriftError::InsufficientSources {
                exposure: 3,
                found: 1,
                required: 2
            }
        );
        assert_eq!(err.kind(), ErrorKind::InsufficientSources);
    }

    #[test]
    fn test_rank_swap_is_flagged_as_jump() {
        // Second star brightens past the first: rank pairing splices them
        let frames = vec![
            frame(1, &[(10.0, 10.0, 9000.0), (50.0, 50.0, 5000.0)]),
            frame(2, &[(11.0, 10.0, 4000.0), (51.0, 50.0, 9500.0)]),
        ];
        let tracks = RankCorrespondence.resolve(&frames).unwrap();
        assert_eq!(tracks[0].detections[1].x, 51.0);

        let warnings = find_jumps(&tracks, &frames, 10.0);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].track, 1);
        assert_eq!(warnings[0].capture, 2);
        assert!(warnings[0].step_px > 50.0);
    }

    #[test]
    fn test_nearest_survives_rank_swap() {
        let frames = vec![
            frame(1, &[(10.0, 10.0, 9000.0), (50.0, 50.0, 5000.0)]),
            frame(2, &[(11.0, 10.0, 4000.0), (51.0, 50.0, 9500.0)]),
        ];
        let strategy = NearestCentroidCorrespondence { max_distance: 5.0 };
        let tracks = strategy.resolve(&frames).unwrap();

        assert_eq!(tracks[0].detections[1].x, 11.0);
        assert_eq!(tracks[1].detections[1].x, 51.0);
        assert!(find_jumps(&tracks, &frames, 10.0).is_empty());
    }

    #[test]
    fn test_nearest_reports_lost_track() {
        let frames = vec![
            frame(1, &[(10.0, 10.0, 9000.0), (50.0, 50.0, 5000.0)]),
            frame(2, &[(11.0, 10.0, 9000.0), (90.0, 90.0, 5000.0)]),
        ];
        let strategy = NearestCentroidCorrespondence { max_distance: 5.0 };
        let err = strategy.resolve(&frames).unwrap_err();
        assert_eq!(
            err,
            DriftError::TrackLost {
                track: 2,
                exposure: 2,
                max_distance: 5.0
            }
        );
    }

    #[test]
    fn test_nearest_is_one_to_one() {
        let frames = vec![
            frame(1, &[(10.0, 10.0, 9000.0), (11.0, 10.0, 5000.0)]),
            frame(2, &[(10.5, 10.0, 9000.0), (12.0, 10.0, 5000.0)]),
        ];
        let strategy = NearestCentroidCorrespondence { max_distance: 5.0 };
        let tracks = strategy.resolve(&frames).unwrap();
        assert_eq!(tracks[0].detections[1].x, 10.5);
        assert_eq!(tracks[1].detections[1].x, 12.0);
    }

    #[test]
    fn test_nearest_reassigns_contested_source() {
        // Track 2 grabs the shared source first; track 1 has no alternative,
        // so track 2 moves to its second choice
        let frames = vec![
            frame(1, &[(10.0, 10.0, 9000.0), (14.0, 10.0, 5000.0)]),
            frame(2, &[(13.0, 10.0, 9000.0), (18.0, 10.0, 5000.0)]),
        ];
        let strategy = NearestCentroidCorrespondence { max_distance: 5.0 };
        let tracks = strategy.resolve(&frames).unwrap();
        assert_eq!(tracks[0].detections[1].x, 13.0);
        assert_eq!(tracks[1].detections[1].x, 18.0);
    }

    #[test]
    fn test_predicted_follows_fast_motion() {
        // Star moves 6 px per frame; a neighbour sits where the last position was
        let frames = vec![
            frame(1, &[(10.0, 10.0, 9000.0)]),
            frame(2, &[(16.0, 10.0, 9000.0), (12.0, 40.0, 100.0)]),
            frame(3, &[(22.0, 10.0, 9000.0), (17.0, 10.0, 3000.0)]),
        ];
        let predicted = MotionPredictedCorrespondence { max_distance: 7.0 };
        let tracks = predicted.resolve(&frames).unwrap();
        assert_eq!(tracks[0].detections[2].x, 22.0);

        let nearest = NearestCentroidCorrespondence { max_distance: 7.0 };
        let tracks = nearest.resolve(&frames).unwrap();
        assert_eq!(tracks[0].detections[2].x, 17.0);
    }

    #[test]
    fn test_config_builds_strategies() {
        assert_eq!(CorrespondenceConfig::default().build().unwrap().name(), "rank");
        assert_eq!(
            CorrespondenceConfig::MotionPredicted { max_distance: 3.0 }
                .build()
                .unwrap()
                .name(),
            "predicted"
        );
        assert!(CorrespondenceConfig::NearestCentroid { max_distance: 0.0 }
            .build()
            .is_err());
    }

    #[test]
    fn test_no_frames() {
        assert_eq!(
            RankCorrespondence.resolve(&[]).unwrap_err(),
            DriftError::NoExposures
        );
    }
}
