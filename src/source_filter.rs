/// Significance gate applied after detection
use serde::{Deserialize, Serialize};

use crate::dao_star_detection::DetectedSource;
use crate::error::{DriftError, Result};

/// A source is kept when its peak is strictly greater than
/// `multiplier * sky_brightness`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignificanceFilter {
    pub sky_brightness: f64,
    pub multiplier: f64,
}

impl Default for SignificanceFilter {
    fn default() -> Self {
        Self {
            sky_brightness: 300.0,
            multiplier: 10.0,
        }
    }
}

impl SignificanceFilter {
    pub fn validate(&self) -> Result<()> {
        if !self.sky_brightness.is_finite() {
            return Err(DriftError::InvalidParameter {
                name: "sky_brightness",
                reason: format!("must be finite, got {}", self.sky_brightness),
            });
        }
        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            return Err(DriftError::InvalidParameter {
                name: "multiplier",
                reason: format!("must be positive, got {}", self.multiplier),
            });
        }
        Ok(())
    }

    pub fn cutoff(&self) -> f64 {
        self.multiplier * self.sky_brightness
    }

    pub fn is_significant(&self, source: &DetectedSource) -> bool {
        source.peak > self.cutoff()
    }

    /// Keep significant sources; detector order is preserved.
    pub fn apply(&self, sources: Vec<DetectedSource>) -> Vec<DetectedSource> {
        sources
            .into_iter()
            .filter(|s| self.is_significant(s))
            .collect()
    }
}
