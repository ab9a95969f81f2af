use crate::config::PipelineConfig;
use crate::utils::truncate_string;
use anyhow::Result;
use std::path::Path;

pub fn list_instruments(config_path: Option<&Path>) -> Result<()> {
    let config = PipelineConfig::load(config_path)?;

    println!("{:<6} {:<30} {:>18}", "No.", "Instrument", "Focal Length");
    println!("{:-<56}", "");

    for (i, profile) in config.instruments.iter().enumerate() {
        println!(
            "{:<6} {:<30} {:>18.1}",
            i + 1,
            truncate_string(&profile.name, 30),
            profile.focal_length
        );
    }

    Ok(())
}
