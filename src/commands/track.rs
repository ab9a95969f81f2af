use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::annotate::write_annotated_png;
use crate::cli::{CorrespondenceArg, OutputFormat};
use crate::config::PipelineConfig;
use crate::correspondence::CorrespondenceConfig;
use crate::fits::load_exposure;
use crate::pipeline::{DriftPipeline, DriftReport};
use crate::utils::output_file_name;

pub struct TrackOptions {
    pub files: Vec<PathBuf>,
    pub interval: f64,
    pub scope: String,
    pub object: Option<String>,
    pub date: Option<String>,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
    pub config: Option<PathBuf>,
    pub correspondence: Option<CorrespondenceArg>,
    pub max_distance: f64,
    pub annotate_dir: Option<PathBuf>,
}

fn strategy(arg: CorrespondenceArg, max_distance: f64) -> CorrespondenceConfig {
    match arg {
        CorrespondenceArg::Rank => CorrespondenceConfig::Rank,
        CorrespondenceArg::Nearest => CorrespondenceConfig::NearestCentroid { max_distance },
        CorrespondenceArg::Predicted => CorrespondenceConfig::MotionPredicted { max_distance },
    }
}

/// Explicit `--output` wins, then `<object>_<date>.csv`.
fn resolve_output(options: &TrackOptions) -> Result<Option<PathBuf>> {
    if let Some(output) = &options.output {
        return Ok(Some(output.clone()));
    }
    match (&options.object, &options.date) {
        (Some(object), Some(date)) => Ok(Some(PathBuf::from(output_file_name(object, date)?))),
        _ => Ok(None),
    }
}

/// Load each exposure in turn, track its sources and write the result table.
pub fn track(options: TrackOptions) -> Result<()> {
    let mut config = PipelineConfig::load(options.config.as_deref())?;
    if let Some(arg) = options.correspondence {
        config.correspondence = strategy(arg, options.max_distance);
    }
    // resolve before any image work so a bad date fails fast
    let output_path = resolve_output(&options)?;

    if let Some(dir) = &options.annotate_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create annotation directory: {}", dir.display()))?;
    }

    let pipeline = DriftPipeline::new(config)?;
    let fwhm = pipeline.config().detection.fwhm;
    let mut run = pipeline.start(&options.scope, options.interval)?;

    for (i, path) in options.files.iter().enumerate() {
        let capture = i + 1;
        let exposure = load_exposure(path, capture)?;
        let frame = run
            .observe(&exposure)
            .with_context(|| format!("Failed to process {}", path.display()))?;

        if let Some(dir) = &options.annotate_dir {
            let png = dir.join(format!("capture_{:03}.png", capture));
            write_annotated_png(&exposure, &frame.sources, fwhm, &png)?;
            info!("Wrote {}", png.display());
        }
    }

    let report = run.finish()?;
    write_report(&report, options.format, output_path.as_deref())
}

fn write_report(report: &DriftReport, format: OutputFormat, output_path: Option<&Path>) -> Result<()> {
    let table = &report.table;

    match output_path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            match format {
                OutputFormat::Json => writeln!(writer, "{}", serde_json::to_string_pretty(report)?)?,
                OutputFormat::Csv | OutputFormat::Table => table.write_csv(&mut writer)?,
            }
            writer.flush()?;
            info!("Wrote {} rows to {}", table.rows.len(), path.display());

            if format == OutputFormat::Table {
                print!("{}", table.format_table());
            }
        }
        None => match format {
            OutputFormat::Csv => table.write_csv(io::stdout().lock())?,
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
            OutputFormat::Table => print!("{}", table.format_table()),
        },
    }
    Ok(())
}
