//! Error types for the drift-rate pipeline.
//!
//! Every variant carries 1-based capture and track numbers so a failed run can
//! be traced back to the exposure that caused it.

use thiserror::Error;

/// The four failure classes a run can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    EmptyDetection,
    InsufficientSources,
    MetadataMismatch,
}

/// Errors produced by the detection, correspondence and rate stages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriftError {
    #[error("unknown instrument '{name}', available: {available}")]
    UnknownInstrument { name: String, available: String },

    #[error("instrument '{instrument}' has invalid focal length {focal_length}")]
    InvalidFocalLength { instrument: String, focal_length: f64 },

    #[error("capture interval must be positive, got {interval}s")]
    InvalidInterval { interval: f64 },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("no exposures supplied")]
    NoExposures,

    #[error("capture {exposure}: no significant sources after filtering")]
    EmptyDetection { exposure: usize },

    #[error("capture {exposure}: {found} significant sources, but {required} tracks were established by capture 1")]
    InsufficientSources {
        exposure: usize,
        found: usize,
        required: usize,
    },

    #[error("source {track} lost at capture {exposure}: no unclaimed source within {max_distance:.1} px")]
    TrackLost {
        track: usize,
        exposure: usize,
        max_distance: f64,
    },

    #[error("capture {exposure}: pixel pitch {found:?} differs from capture 1 pitch {expected:?}")]
    PixelPitchMismatch {
        exposure: usize,
        expected: (f64, f64),
        found: (f64, f64),
    },

    #[error("capture {exposure}: dimensions {found:?} differ from capture 1 dimensions {expected:?}")]
    DimensionMismatch {
        exposure: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("capture {exposure}: {reason}")]
    MalformedExposure { exposure: usize, reason: String },
}

impl DriftError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriftError::UnknownInstrument { .. }
            | DriftError::InvalidFocalLength { .. }
            | DriftError::InvalidInterval { .. }
            | DriftError::InvalidParameter { .. }
            | DriftError::NoExposures => ErrorKind::Configuration,
            DriftError::EmptyDetection { .. } => ErrorKind::EmptyDetection,
            DriftError::InsufficientSources { .. } | DriftError::TrackLost { .. } => {
                ErrorKind::InsufficientSources
            }
            DriftError::PixelPitchMismatch { .. }
            | DriftError::DimensionMismatch { .. }
            | DriftError::MalformedExposure { .. } => ErrorKind::MetadataMismatch,
        }
    }
}

pub type Result<T> = std::result::Result<T, DriftError>;
