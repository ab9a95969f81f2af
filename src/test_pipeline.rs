// Synthetic sky frames and end-to-end drift runs.
//
// Stars are rendered as exact Gaussians over the whole frame so the detector's
// matched kernel sees the profile it was built for. Integer star positions
// give exact centroids, which keeps the rate assertions tight.

use crate::dao_star_detection::DaoParams;
use crate::image_analysis::Exposure;
use crate::optics::PixelPitch;
use rand::prelude::*;

pub(crate) const FRAME_SIZE: usize = 200;
pub(crate) const SKY: f64 = 300.0;
pub(crate) const FWHM: f64 = 4.0;

/// Flat background plus Gaussian stars `(x, y, amplitude)`.
pub(crate) fn render_frame(
    width: usize,
    height: usize,
    background: f64,
    stars: &[(f64, f64, f64)],
    fwhm: f64,
) -> Vec<f64> {
    let sigma = fwhm / (2.0 * (2.0 * 2f64.ln()).sqrt());
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut data = vec![background; width * height];

    for &(sx, sy, amplitude) in stars {
        for y in 0..height {
            for x in 0..width {
                let dx = x as f64 - sx;
                let dy = y as f64 - sy;
                data[y * width + x] += amplitude * (-(dx * dx + dy * dy) / two_sigma_sq).exp();
            }
        }
    }
    data
}

/// Uniform noise in `[-amplitude, amplitude)` from a fixed seed.
pub(crate) fn add_noise(data: &mut [f64], amplitude: f64, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for pixel in data.iter_mut() {
        *pixel += rng.gen_range(-amplitude..amplitude);
    }
}

pub(crate) fn exposure_with_stars(capture: usize, stars: &[(f64, f64, f64)]) -> Exposure {
    let data = render_frame(FRAME_SIZE, FRAME_SIZE, SKY, stars, FWHM);
    Exposure::new(capture, FRAME_SIZE, FRAME_SIZE, data, PixelPitch::square(9.0))
        .expect("synthetic exposure")
}

pub(crate) fn test_params() -> DaoParams {
    DaoParams {
        fwhm: FWHM,
        ..DaoParams::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::correspondence::CorrespondenceConfig;
    use crate::error::{DriftError, ErrorKind};
    use crate::pipeline::DriftPipeline;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    /// Main Scope, 9 um pixels
    const ARCSEC_PER_PIXEL: f64 = 9.0 / 6500.0 * 3600.0;

    fn pipeline(correspondence: CorrespondenceConfig) -> DriftPipeline {
        DriftPipeline::new(PipelineConfig {
            detection: test_params(),
            correspondence,
            ..PipelineConfig::default()
        })
        .unwrap()
    }

    /// Two stars drifting by (dx, dy) px per capture.
    fn drifting_sequence(count: usize, dx: f64, dy: f64) -> Vec<Exposure> {
        (0..count)
            .map(|i| {
                let step = i as f64;
                exposure_with_stars(
                    i + 1,
                    &[
                        (60.0 + dx * step, 70.0 + dy * step, 20000.0),
                        (130.0 + dx * step, 120.0 + dy * step, 9000.0),
                    ],
                )
            })
            .collect()
    }

    fn start_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(22, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_stationary_stars_have_zero_rate() {
        let exposures = drifting_sequence(3, 0.0, 0.0);
        let report = pipeline(CorrespondenceConfig::Rank)
            .run(&exposures, "Main Scope", 10.0)
            .unwrap();

        assert_eq!(report.table.rows.len(), 6);
        for row in &report.table.rows {
            if let Some(motion) = row.motion {
                assert_abs_diff_eq!(motion.movement_x, 0.0, epsilon = 1e-9);
                assert_abs_diff_eq!(motion.rate_y, 0.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_linear_drift() {
        let exposures = drifting_sequence(4, 2.0, -1.0);
        let report = pipeline(CorrespondenceConfig::Rank)
            .run(&exposures, "Main Scope", 10.0)
            .unwrap();

        assert_eq!(report.captures, 4);
        assert_relative_eq!(report.scale.arcsec_per_pixel_x, ARCSEC_PER_PIXEL);
        assert_eq!(report.table.rows.len(), 8);
        assert!(report.table.jump_warnings.is_empty());

        for row in &report.table.rows {
            let Some(motion) = row.motion else {
                assert_eq!(row.capture, 1);
                continue;
            };
            assert_relative_eq!(motion.movement_x, 2.0 * ARCSEC_PER_PIXEL, max_relative = 1e-6);
            assert_relative_eq!(motion.rate_x, 2.0 * ARCSEC_PER_PIXEL / 10.0, max_relative = 1e-6);
            assert_relative_eq!(motion.rate_y, -ARCSEC_PER_PIXEL / 10.0, max_relative = 1e-6);
        }

        let summary = report.table.summaries[1];
        assert_eq!(summary.source, 2);
        assert_eq!(summary.elapsed_seconds, 30.0);
        assert_relative_eq!(summary.net_movement_x, 6.0 * ARCSEC_PER_PIXEL, max_relative = 1e-6);
    }

    #[test]
    fn test_rows_are_track_major() {
        let exposures = drifting_sequence(3, 1.0, 0.0);
        let report = pipeline(CorrespondenceConfig::Rank)
            .run(&exposures, "1", 5.0)
            .unwrap();

        let order: Vec<(usize, usize)> = report
            .table
            .rows
            .iter()
            .map(|r| (r.source, r.capture))
            .collect();
        assert_eq!(order, vec![(1, 1), (1, 2), (1, 3), (2, 1), (2, 2), (2, 3)]);
        assert_abs_diff_eq!(report.table.rows[0].centroid_x, 60.0, epsilon = 1e-6);
        assert_abs_diff_eq!(report.table.rows[3].centroid_y, 120.0, epsilon = 1e-6);
        assert!(report
            .table
            .rows
            .iter()
            .all(|r| r.motion.is_none() == (r.capture == 1)));
    }

    #[test]
    fn test_finderscope_scale() {
        let exposures = drifting_sequence(2, 3.0, 0.0);
        let report = pipeline(CorrespondenceConfig::Rank)
            .run(&exposures, "finderscope", 10.0)
            .unwrap();

        let motion = report.table.rows[1].motion.unwrap();
        assert_relative_eq!(motion.movement_x, 3.0 * 9.0 / 1140.0 * 3600.0, max_relative = 1e-6);
    }

    #[test]
    fn test_source_leaving_field_aborts_run() {
        let exposures = vec![
            exposure_with_stars(1, &[(60.0, 70.0, 20000.0), (130.0, 120.0, 9000.0)]),
            exposure_with_stars(2, &[(62.0, 70.0, 20000.0)]),
        ];
        let err = pipeline(CorrespondenceConfig::Rank)
            .run(&exposures, "Main Scope", 10.0)
            .unwrap_err();

        assert_eq!(
            err,
            DriftError::InsufficientSources {
                exposure: 2,
                found: 1,
                required: 2
            }
        );
        assert_eq!(err.kind(), ErrorKind::InsufficientSources);
    }

    #[test]
    fn test_frame_without_significant_sources() {
        let exposures = vec![
            exposure_with_stars(1, &[(60.0, 70.0, 20000.0)]),
            exposure_with_stars(2, &[(62.0, 70.0, 2000.0)]),
        ];
        let err = pipeline(CorrespondenceConfig::Rank)
            .run(&exposures, "Main Scope", 10.0)
            .unwrap_err();
        assert_eq!(err, DriftError::EmptyDetection { exposure: 2 });
    }

    #[test]
    fn test_unknown_instrument() {
        let err = pipeline(CorrespondenceConfig::Rank)
            .run(&drifting_sequence(2, 1.0, 0.0), "Hubble", 10.0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("Main Scope"));
    }

    #[test]
    fn test_brightness_swap() {
        let exposures = vec![
            exposure_with_stars(1, &[(60.0, 70.0, 20000.0), (130.0, 120.0, 9000.0)]),
            exposure_with_stars(2, &[(62.0, 70.0, 9000.0), (132.0, 120.0, 20000.0)]),
        ];

        // rank pairing follows brightness and reports the jump
        let report = pipeline(CorrespondenceConfig::Rank)
            .run(&exposures, "Main Scope", 10.0)
            .unwrap();
        assert_eq!(report.table.jump_warnings.len(), 2);
        assert_eq!(report.table.jump_warnings[0].capture, 2);

        // spatial pairing keeps each star on its own track
        let report = pipeline(CorrespondenceConfig::NearestCentroid { max_distance: 10.0 })
            .run(&exposures, "Main Scope", 10.0)
            .unwrap();
        assert!(report.table.jump_warnings.is_empty());
        assert_eq!(report.strategy, "nearest");
        for row in report.table.rows.iter().filter(|r| r.capture == 2) {
            let motion = row.motion.unwrap();
            assert_relative_eq!(motion.movement_x, 2.0 * ARCSEC_PER_PIXEL, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_noisy_frames() {
        let exposures: Vec<Exposure> = (0..3)
            .map(|i| {
                let step = 2.0 * i as f64;
                let mut data = render_frame(
                    FRAME_SIZE,
                    FRAME_SIZE,
                    SKY,
                    &[(60.5 + step, 70.25, 20000.0), (130.0 + step, 120.0, 9000.0)],
                    FWHM,
                );
                add_noise(&mut data, 20.0, 42 + i as u64);
                Exposure::new(i + 1, FRAME_SIZE, FRAME_SIZE, data, PixelPitch::square(9.0)).unwrap()
            })
            .collect();

        let report = pipeline(CorrespondenceConfig::Rank)
            .run(&exposures, "Main Scope", 10.0)
            .unwrap();

        assert_eq!(report.table.track_count(), 2);
        for row in &report.table.rows {
            if let Some(motion) = row.motion {
                assert_abs_diff_eq!(motion.rate_x, 2.0 * ARCSEC_PER_PIXEL / 10.0, epsilon = 0.05);
                assert_abs_diff_eq!(motion.rate_y, 0.0, epsilon = 0.05);
            }
        }
    }

    #[test]
    fn test_cadence_warning_in_report() {
        let offsets = [0, 10, 30];
        let exposures: Vec<Exposure> = drifting_sequence(3, 1.0, 0.0)
            .into_iter()
            .zip(offsets)
            .map(|(e, s)| e.with_timestamp(start_time() + Duration::seconds(s)))
            .collect();

        let report = pipeline(CorrespondenceConfig::Rank)
            .run(&exposures, "Main Scope", 10.0)
            .unwrap();
        assert_eq!(report.table.cadence_warnings.len(), 1);
        assert_eq!(report.table.cadence_warnings[0].capture, 3);
        // rates still use the configured interval
        let motion = report.table.rows[2].motion.unwrap();
        assert_relative_eq!(motion.rate_x, ARCSEC_PER_PIXEL / 10.0, max_relative = 1e-6);
    }

    #[test]
    fn test_streaming_run() {
        let pipeline = pipeline(CorrespondenceConfig::MotionPredicted { max_distance: 6.0 });
        let mut run = pipeline.start("Main Scope", 10.0).unwrap();
        for exposure in drifting_sequence(4, 4.0, 0.0) {
            let frame = run.observe(&exposure).unwrap();
            assert_eq!(frame.sources.len(), 2);
        }
        assert_eq!(run.frames().len(), 4);

        let report = run.finish().unwrap();
        assert_eq!(report.strategy, "predicted");
        assert_eq!(report.table.rows.len(), 8);
    }
}
