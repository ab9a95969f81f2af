/// Per-exposure detection across a capture sequence
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info};

use crate::dao_star_detection::{DaoStarFinder, DetectedSource};
use crate::error::{DriftError, Result};
use crate::image_analysis::Exposure;
use crate::optics::PixelPitch;
use crate::source_filter::SignificanceFilter;

/// Filtered sources of one exposure. Pixel data is not retained.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSources {
    pub capture: usize,
    pub timestamp: Option<NaiveDateTime>,
    pub threshold: f64,
    pub median: f64,
    /// Count before the significance filter
    pub detected: usize,
    pub sources: Vec<DetectedSource>,
}

#[derive(Debug, Clone, Copy)]
struct Reference {
    width: usize,
    height: usize,
    pitch: PixelPitch,
}

/// Runs detector and filter over exposures in capture order, checking that
/// every exposure shares the first one's geometry.
pub struct FrameSeries {
    detector: DaoStarFinder,
    filter: SignificanceFilter,
    reference: Option<Reference>,
    frames: Vec<FrameSources>,
}

impl FrameSeries {
    pub fn new(detector: DaoStarFinder, filter: SignificanceFilter) -> Result<Self> {
        filter.validate()?;
        Ok(Self {
            detector,
            filter,
            reference: None,
            frames: Vec::new(),
        })
    }

    /// Detect and filter the next exposure. Exposures must arrive in
    /// capture order starting at 1.
    pub fn observe(&mut self, exposure: &Exposure) -> Result<&FrameSources> {
        let expected = self.frames.len() + 1;
        if exposure.capture != expected {
            return Err(DriftError::MalformedExposure {
                exposure: exposure.capture,
                reason: format!("out of order, expected capture {}", expected),
            });
        }
        self.check_geometry(exposure)?;

        let detection = self.detector.detect(exposure);
        let detected = detection.sources.len();
        let sources = self.filter.apply(detection.sources);

        debug!(
            capture = exposure.capture,
            detected,
            significant = sources.len(),
            cutoff = self.filter.cutoff(),
            "filtered sources"
        );

        if sources.is_empty() {
            return Err(DriftError::EmptyDetection {
                exposure: exposure.capture,
            });
        }

        info!(
            "Capture {}: {} sources detected, {} significant",
            exposure.capture,
            detected,
            sources.len()
        );

        self.frames.push(FrameSources {
            capture: exposure.capture,
            timestamp: exposure.timestamp,
            threshold: detection.threshold,
            median: detection.statistics.median,
            detected,
            sources,
        });
        Ok(&self.frames[self.frames.len() - 1])
    }

    fn check_geometry(&mut self, exposure: &Exposure) -> Result<()> {
        let Some(reference) = self.reference else {
            self.reference = Some(Reference {
                width: exposure.width,
                height: exposure.height,
                pitch: exposure.pixel_pitch,
            });
            return Ok(());
        };

        if (exposure.width, exposure.height) != (reference.width, reference.height) {
            return Err(DriftError::DimensionMismatch {
                exposure: exposure.capture,
                expected: (reference.width, reference.height),
                found: (exposure.width, exposure.height),
            });
        }
        if !same_pitch(reference.pitch.x, exposure.pixel_pitch.x)
            || !same_pitch(reference.pitch.y, exposure.pixel_pitch.y)
        {
            return Err(DriftError::PixelPitchMismatch {
                exposure: exposure.capture,
                expected: (reference.pitch.x, reference.pitch.y),
                found: (exposure.pixel_pitch.x, exposure.pixel_pitch.y),
            });
        }
        Ok(())
    }

    /// Pixel pitch shared by every observed exposure.
    pub fn pixel_pitch(&self) -> Option<PixelPitch> {
        self.reference.map(|r| r.pitch)
    }

    pub fn frames(&self) -> &[FrameSources] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<FrameSources> {
        self.frames
    }
}

fn same_pitch(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs())
}
