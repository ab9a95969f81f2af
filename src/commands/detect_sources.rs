use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::config::PipelineConfig;
use crate::dao_star_detection::{DaoStarFinder, DetectedSource};
use crate::fits::load_exposure;
use crate::image_analysis::ImageStatistics;

#[derive(Serialize)]
struct DetectionOutput<'a> {
    file: String,
    statistics: &'a ImageStatistics,
    threshold: f64,
    detected: usize,
    significance_cutoff: f64,
    sources: &'a [DetectedSource],
}

/// Run the detector and significance filter on one exposure.
pub fn detect_sources(file: &Path, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = PipelineConfig::load(config_path)?;
    let exposure = load_exposure(file, 1)?;

    let detector = DaoStarFinder::new(config.detection.clone())?;
    let detection = detector.detect(&exposure);
    let detected = detection.sources.len();
    let sources = config.significance.apply(detection.sources);

    if format == OutputFormat::Json {
        let output = DetectionOutput {
            file: file.display().to_string(),
            statistics: &detection.statistics,
            threshold: detection.threshold,
            detected,
            significance_cutoff: config.significance.cutoff(),
            sources: &sources,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let stats = &detection.statistics;
    println!("File: {}", file.display());
    println!(
        "Image: {}x{}  Median: {:.1}  Mean: {:.1}  MAD: {:.1}  Min: {:.0}  Max: {:.0}",
        stats.width, stats.height, stats.median, stats.mean, stats.mad, stats.min, stats.max
    );
    println!(
        "Threshold: {:.1}  Detected: {}  Significant (> {:.0}): {}",
        detection.threshold,
        detected,
        config.significance.cutoff(),
        sources.len()
    );
    println!();
    println!(
        "{:<6} {:>10} {:>10} {:>12} {:>12} {:>10} {:>10}",
        "Rank", "X", "Y", "Peak", "Background", "Sharp", "Round"
    );
    println!("{:-<76}", "");
    for source in &sources {
        println!(
            "{:<6} {:>10.3} {:>10.3} {:>12.1} {:>12.1} {:>10.3} {:>10.3}",
            source.rank, source.x, source.y, source.peak, source.background, source.sharpness, source.roundness
        );
    }

    Ok(())
}
