/// Run-wide configuration, fixed for the duration of a run
use std::path::Path;

use anyhow::{Context, Result as AnyResult};
use serde::{Deserialize, Serialize};

use crate::correspondence::CorrespondenceConfig;
use crate::dao_star_detection::DaoParams;
use crate::error::{DriftError, Result};
use crate::optics::{default_instruments, InstrumentProfile};
use crate::source_filter::SignificanceFilter;

/// Constant applied to pitch / focal length to obtain arcsec per pixel
pub const DEFAULT_SCALE_CONSTANT: f64 = 3600.0;

/// Relative deviation between timestamp gaps and the configured interval
/// before a cadence warning is raised
pub const DEFAULT_CADENCE_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub instruments: Vec<InstrumentProfile>,
    pub detection: DaoParams,
    pub significance: SignificanceFilter,
    pub scale_constant: f64,
    pub correspondence: CorrespondenceConfig,
    /// Track steps longer than this many pixels are reported
    pub jump_warning_px: f64,
    pub cadence_tolerance: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            instruments: default_instruments(),
            detection: DaoParams::default(),
            significance: SignificanceFilter::default(),
            scale_constant: DEFAULT_SCALE_CONSTANT,
            correspondence: CorrespondenceConfig::default(),
            jump_warning_px: 20.0,
            cadence_tolerance: DEFAULT_CADENCE_TOLERANCE,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> AnyResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> AnyResult<Self> {
        match path {
            Some(path) => Self::from_json_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for profile in &self.instruments {
            if !profile.focal_length.is_finite() || profile.focal_length <= 0.0 {
                return Err(DriftError::InvalidFocalLength {
                    instrument: profile.name.clone(),
                    focal_length: profile.focal_length,
                });
            }
        }
        self.detection.validate()?;
        self.significance.validate()?;
        if !self.scale_constant.is_finite() || self.scale_constant <= 0.0 {
            return Err(DriftError::InvalidParameter {
                name: "scale_constant",
                reason: format!("must be positive, got {}", self.scale_constant),
            });
        }
        self.correspondence.build()?;
        if !(self.jump_warning_px > 0.0) {
            return Err(DriftError::InvalidParameter {
                name: "jump_warning_px",
                reason: format!("must be positive, got {}", self.jump_warning_px),
            });
        }
        if !self.cadence_tolerance.is_finite() || self.cadence_tolerance < 0.0 {
            return Err(DriftError::InvalidParameter {
                name: "cadence_tolerance",
                reason: format!("must be non-negative, got {}", self.cadence_tolerance),
            });
        }
        Ok(())
    }
}
