/// Pixel displacement to angular drift rate
use serde::Serialize;

use crate::correspondence::SourceTrack;
use crate::error::{DriftError, Result};
use crate::optics::OpticalScale;

/// Motion since the previous capture. Undefined for a track's first capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameMotion {
    /// arcsec
    pub movement_x: f64,
    /// arcsec / s
    pub rate_x: f64,
    pub movement_y: f64,
    pub rate_y: f64,
}

/// One row of the result: a track at one capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateRecord {
    /// 1-based track id
    pub source: usize,
    /// 1-based capture number
    pub capture: usize,
    pub centroid_x: f64,
    pub centroid_y: f64,
    pub motion: Option<FrameMotion>,
}

/// Net drift of one track over the whole sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackSummary {
    pub source: usize,
    pub captures: usize,
    pub elapsed_seconds: f64,
    /// arcsec, first to last capture
    pub net_movement_x: f64,
    pub net_movement_y: f64,
    /// arcsec / s, net movement over elapsed time
    pub mean_rate_x: f64,
    pub mean_rate_y: f64,
}

pub struct RateCalculator {
    scale: OpticalScale,
    interval_seconds: f64,
}

impl RateCalculator {
    pub fn new(scale: OpticalScale, interval_seconds: f64) -> Result<Self> {
        if !interval_seconds.is_finite() || interval_seconds <= 0.0 {
            return Err(DriftError::InvalidInterval {
                interval: interval_seconds,
            });
        }
        Ok(Self {
            scale,
            interval_seconds,
        })
    }

    pub fn scale(&self) -> OpticalScale {
        self.scale
    }

    pub fn interval_seconds(&self) -> f64 {
        self.interval_seconds
    }

    /// Records for every (track, capture) pair, track-major.
    pub fn compute(&self, tracks: &[SourceTrack]) -> Vec<RateRecord> {
        let mut records = Vec::with_capacity(tracks.iter().map(|t| t.detections.len()).sum());

        for track in tracks {
            for (j, detection) in track.detections.iter().enumerate() {
                let motion = if j == 0 {
                    None
                } else {
                    let previous = &track.detections[j - 1];
                    Some(self.motion(detection.x - previous.x, detection.y - previous.y))
                };

                records.push(RateRecord {
                    source: track.id,
                    capture: j + 1,
                    centroid_x: detection.x,
                    centroid_y: detection.y,
                    motion,
                });
            }
        }
        records
    }

    fn motion(&self, dx: f64, dy: f64) -> FrameMotion {
        let (movement_x, movement_y) = self.scale.to_arcsec(dx, dy);
        FrameMotion {
            movement_x,
            rate_x: movement_x / self.interval_seconds,
            movement_y,
            rate_y: movement_y / self.interval_seconds,
        }
    }

    /// First-to-last drift per track. Tracks with a single capture report
    /// zero movement and zero rate.
    pub fn summarize(&self, tracks: &[SourceTrack]) -> Vec<TrackSummary> {
        tracks
            .iter()
            .filter_map(|track| {
                let first = track.detections.first()?;
                let last = track.detections.last()?;
                let intervals = track.detections.len() - 1;
                let elapsed_seconds = intervals as f64 * self.interval_seconds;
                let (net_movement_x, net_movement_y) =
                    self.scale.to_arcsec(last.x - first.x, last.y - first.y);
                let (mean_rate_x, mean_rate_y) = if intervals == 0 {
                    (0.0, 0.0)
                } else {
                    (net_movement_x / elapsed_seconds, net_movement_y / elapsed_seconds)
                };

                Some(TrackSummary {
                    source: track.id,
                    captures: track.detections.len(),
                    elapsed_seconds,
                    net_movement_x,
                    net_movement_y,
                    mean_rate_x,
                    mean_rate_y,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao_star_detection::DetectedSource;
    use crate::optics::{InstrumentProfile, PixelPitch};
    use approx::assert_relative_eq;

    fn main_scope_scale() -> OpticalScale {
        OpticalScale::from_instrument(
            &InstrumentProfile::new("Main Scope", 6500.0),
            PixelPitch::square(9.0),
            3600.0,
        )
        .unwrap()
    }

    fn track(id: usize, positions: &[(f64, f64)]) -> SourceTrack {
        SourceTrack {
            id,
            detections: positions
                .iter()
                .enumerate()
                .map(|(i, &(x, y))| DetectedSource {
                    rank: i + 1,
                    x,
                    y,
                    peak: 5000.0,
                    background: 300.0,
                    flux: 50000.0,
                    sharpness: 0.5,
                    roundness: 0.0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_three_capture_scenario() {
        let scale = main_scope_scale();
        let calculator = RateCalculator::new(scale, 10.0).unwrap();
        let records =
            calculator.compute(&[track(1, &[(100.0, 100.0), (102.0, 100.0), (104.0, 100.0)])]);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].motion, None);
        assert_eq!(records[0].centroid_x, 100.0);

        for record in &records[1..] {
            let motion = record.motion.unwrap();
            assert_relative_eq!(motion.movement_x, 2.0 * scale.arcsec_per_pixel_x);
            assert_relative_eq!(motion.rate_x, 2.0 * scale.arcsec_per_pixel_x / 10.0);
            assert_eq!(motion.movement_y, 0.0);
            assert_eq!(motion.rate_y, 0.0);
            assert_eq!(record.centroid_y, 100.0);
        }
    }

    #[test]
    fn test_track_major_order() {
        let calculator = RateCalculator::new(main_scope_scale(), 5.0).unwrap();
        let records = calculator.compute(&[
            track(1, &[(10.0, 10.0), (11.0, 10.0)]),
            track(2, &[(50.0, 50.0), (50.0, 49.0)]),
        ]);

        let order: Vec<(usize, usize)> = records.iter().map(|r| (r.source, r.capture)).collect();
        assert_eq!(order, vec![(1, 1), (1, 2), (2, 1), (2, 2)]);
        assert!(records[3].motion.unwrap().rate_y < 0.0);
    }

    #[test]
    fn test_summary() {
        let scale = main_scope_scale();
        let calculator = RateCalculator::new(scale, 10.0).unwrap();
        let summaries = calculator.summarize(&[
            track(1, &[(100.0, 100.0), (102.0, 101.0), (104.0, 102.0)]),
            track(2, &[(30.0, 30.0)]),
        ]);

        assert_eq!(summaries[0].captures, 3);
        assert_eq!(summaries[0].elapsed_seconds, 20.0);
        assert_relative_eq!(summaries[0].net_movement_x, 4.0 * scale.arcsec_per_pixel_x);
        assert_relative_eq!(summaries[0].mean_rate_y, 2.0 * scale.arcsec_per_pixel_y / 20.0);
        assert_eq!(summaries[1].mean_rate_x, 0.0);
    }

    #[test]
    fn test_non_positive_interval() {
        assert_eq!(
            RateCalculator::new(main_scope_scale(), 0.0).err(),
            Some(DriftError::InvalidInterval { interval: 0.0 })
        );
        assert!(RateCalculator::new(main_scope_scale(), -5.0).is_err());
        assert!(RateCalculator::new(main_scope_scale(), f64::NAN).is_err());
    }
}
