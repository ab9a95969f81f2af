/// End-to-end drift measurement: exposures in, result table out
use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::correspondence::{find_jumps, CorrespondenceStrategy};
use crate::dao_star_detection::DaoStarFinder;
use crate::error::{DriftError, Result};
use crate::frame_series::{FrameSeries, FrameSources};
use crate::image_analysis::Exposure;
use crate::optics::{select_instrument, InstrumentProfile, OpticalScale};
use crate::rates::RateCalculator;
use crate::result_table::{CadenceWarning, ResultTable};

#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    pub instrument: InstrumentProfile,
    pub scale: OpticalScale,
    pub interval_seconds: f64,
    pub strategy: &'static str,
    pub captures: usize,
    pub table: ResultTable,
}

pub struct DriftPipeline {
    config: PipelineConfig,
    strategy: Box<dyn CorrespondenceStrategy>,
}

impl DriftPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let strategy = config.correspondence.build()?;
        Ok(Self { config, strategy })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Begin a run. Instrument and interval are checked here, before any
    /// exposure is processed.
    pub fn start(&self, instrument: &str, interval_seconds: f64) -> Result<DriftRun<'_>> {
        let instrument = select_instrument(&self.config.instruments, instrument)?.clone();
        if !interval_seconds.is_finite() || interval_seconds <= 0.0 {
            return Err(DriftError::InvalidInterval {
                interval: interval_seconds,
            });
        }

        let detector = DaoStarFinder::new(self.config.detection.clone())?;
        let series = FrameSeries::new(detector, self.config.significance)?;

        info!(
            "Tracking with {} (focal length {}), interval {}s, {} correspondence",
            instrument.name,
            instrument.focal_length,
            interval_seconds,
            self.strategy.name()
        );

        Ok(DriftRun {
            pipeline: self,
            instrument,
            interval_seconds,
            series,
        })
    }

    /// Process a complete in-memory sequence.
    pub fn run(
        &self,
        exposures: &[Exposure],
        instrument: &str,
        interval_seconds: f64,
    ) -> Result<DriftReport> {
        let mut run = self.start(instrument, interval_seconds)?;
        for exposure in exposures {
            run.observe(exposure)?;
        }
        run.finish()
    }
}

/// A run in progress. Only filtered source lists are kept between exposures.
pub struct DriftRun<'a> {
    pipeline: &'a DriftPipeline,
    instrument: InstrumentProfile,
    interval_seconds: f64,
    series: FrameSeries,
}

impl DriftRun<'_> {
    pub fn observe(&mut self, exposure: &Exposure) -> Result<&FrameSources> {
        self.series.observe(exposure)
    }

    pub fn frames(&self) -> &[FrameSources] {
        self.series.frames()
    }

    /// Resolve tracks and compute rates. Nothing is produced unless every
    /// track spans every exposure.
    pub fn finish(self) -> Result<DriftReport> {
        let config = &self.pipeline.config;
        let pitch = self.series.pixel_pitch().ok_or(DriftError::NoExposures)?;
        let frames = self.series.into_frames();

        let tracks = self.pipeline.strategy.resolve(&frames)?;

        let jump_warnings = find_jumps(&tracks, &frames, config.jump_warning_px);
        for jump in &jump_warnings {
            warn!(
                "Source {} moved {:.1} px into capture {}; correspondence may have swapped stars",
                jump.track, jump.step_px, jump.capture
            );
        }

        let cadence_warnings = check_cadence(&frames, self.interval_seconds, config.cadence_tolerance);
        for gap in &cadence_warnings {
            warn!(
                "Capture {} was taken {:.1}s after the previous one, expected {:.1}s",
                gap.capture, gap.observed_seconds, gap.expected_seconds
            );
        }

        let scale = OpticalScale::from_instrument(&self.instrument, pitch, config.scale_constant)?;
        let calculator = RateCalculator::new(scale, self.interval_seconds)?;

        let mut table = ResultTable::new(calculator.compute(&tracks), calculator.summarize(&tracks));
        table.jump_warnings = jump_warnings;
        table.cadence_warnings = cadence_warnings;

        info!(
            "Measured {} sources over {} captures ({:.4}\"/px x, {:.4}\"/px y)",
            tracks.len(),
            frames.len(),
            scale.arcsec_per_pixel_x,
            scale.arcsec_per_pixel_y
        );

        Ok(DriftReport {
            instrument: self.instrument,
            scale,
            interval_seconds: self.interval_seconds,
            strategy: self.pipeline.strategy.name(),
            captures: frames.len(),
            table,
        })
    }
}

/// Compare timestamp gaps against the configured interval. Skipped unless
/// every frame carries a timestamp.
pub fn check_cadence(
    frames: &[FrameSources],
    interval_seconds: f64,
    tolerance: f64,
) -> Vec<CadenceWarning> {
    if frames.len() < 2 {
        return Vec::new();
    }
    let Some(timestamps) = frames
        .iter()
        .map(|f| f.timestamp)
        .collect::<Option<Vec<_>>>()
    else {
        return Vec::new();
    };

    timestamps
        .windows(2)
        .zip(&frames[1..])
        .filter_map(|(pair, frame)| {
            let observed_seconds = (pair[1] - pair[0]).num_milliseconds() as f64 / 1000.0;
            let deviation = (observed_seconds - interval_seconds).abs();
            (deviation > tolerance * interval_seconds).then_some(CadenceWarning {
                capture: frame.capture,
                observed_seconds,
                expected_seconds: interval_seconds,
            })
        })
        .collect()
}
