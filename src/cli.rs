use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "star-drift")]
#[command(about = "Measure apparent drift rates of stars across a sequence of FITS exposures", long_about = None)]
pub struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Track stars across exposures and report drift rates
    Track {
        /// FITS exposures in capture order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Seconds between consecutive captures
        #[arg(short, long)]
        interval: f64,

        /// Instrument name or catalog number
        #[arg(short, long)]
        scope: String,

        /// Object name, used for the default output file name
        #[arg(long, requires = "date")]
        object: Option<String>,

        /// Capture date (YYYYMMDD), used for the default output file name
        #[arg(long, requires = "object")]
        date: Option<String>,

        /// Output file; defaults to <object>_<date>.csv when both are given
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured correspondence strategy
        #[arg(long, value_enum)]
        correspondence: Option<CorrespondenceArg>,

        /// Search radius in pixels for nearest/predicted correspondence
        #[arg(long, default_value_t = 20.0)]
        max_distance: f64,

        /// Write an annotated PNG per exposure into this directory
        #[arg(long)]
        annotate_dir: Option<PathBuf>,
    },

    /// Detect and filter sources in a single exposure
    Detect {
        /// FITS file
        file: PathBuf,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format (table or json)
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// List the instrument catalog
    Instruments {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the default configuration as JSON
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CorrespondenceArg {
    Rank,
    Nearest,
    Predicted,
}
