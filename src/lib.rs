pub mod annotate;
pub mod cli;
pub mod commands;
pub mod config;
pub mod correspondence;
pub mod dao_star_detection;
pub mod error;
pub mod fits;
pub mod frame_series;
pub mod image_analysis;
pub mod mtf_stretch;
pub mod optics;
pub mod pipeline;
pub mod rates;
pub mod result_table;
pub mod source_filter;
pub mod utils;

#[cfg(test)]
mod test_pipeline;

// Re-export commonly used items
pub use config::PipelineConfig;
pub use error::{DriftError, ErrorKind};
pub use image_analysis::{Exposure, ImageStatistics};
pub use pipeline::{DriftPipeline, DriftReport};
