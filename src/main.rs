use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use star_drift::cli::{Cli, Commands};
use star_drift::commands::{detect_sources, list_instruments, track, TrackOptions};
use star_drift::PipelineConfig;

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Track {
            files,
            interval,
            scope,
            object,
            date,
            output,
            format,
            config,
            correspondence,
            max_distance,
            annotate_dir,
        } => {
            track(TrackOptions {
                files,
                interval,
                scope,
                object,
                date,
                output,
                format,
                config,
                correspondence,
                max_distance,
                annotate_dir,
            })?;
        }
        Commands::Detect {
            file,
            config,
            format,
        } => {
            detect_sources(&file, config.as_deref(), format)?;
        }
        Commands::Instruments { config } => {
            list_instruments(config.as_deref())?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
        }
    }

    Ok(())
}
