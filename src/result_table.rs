/// Final tabular drift result and its writers
use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::correspondence::TrackWarning;
use crate::rates::{RateRecord, TrackSummary};

pub const COLUMNS: [&str; 8] = [
    "Source",
    "Capture",
    "X Centroid (pix)",
    "X Movement (\")",
    "X Rate (\"/s)",
    "Y Centroid (pix)",
    "Y Movement (\")",
    "Y Rate (\"/s)",
];

const UNDEFINED: &str = "N/A";

/// Timestamp gap that disagrees with the configured capture interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CadenceWarning {
    /// Capture that ends the gap
    pub capture: usize,
    pub observed_seconds: f64,
    pub expected_seconds: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultTable {
    pub rows: Vec<RateRecord>,
    pub summaries: Vec<TrackSummary>,
    pub jump_warnings: Vec<TrackWarning>,
    pub cadence_warnings: Vec<CadenceWarning>,
}

impl ResultTable {
    pub fn new(rows: Vec<RateRecord>, summaries: Vec<TrackSummary>) -> Self {
        Self {
            rows,
            summaries,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn track_count(&self) -> usize {
        self.summaries.len()
    }

    /// Cells of one row in column order; undefined motion cells are `N/A`.
    pub fn cells(record: &RateRecord) -> [String; 8] {
        let motion = |value: Option<f64>| value.map_or_else(|| UNDEFINED.to_string(), |v| v.to_string());
        [
            record.source.to_string(),
            record.capture.to_string(),
            record.centroid_x.to_string(),
            motion(record.motion.map(|m| m.movement_x)),
            motion(record.motion.map(|m| m.rate_x)),
            record.centroid_y.to_string(),
            motion(record.motion.map(|m| m.movement_y)),
            motion(record.motion.map(|m| m.rate_y)),
        ]
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(COLUMNS)?;
        for record in &self.rows {
            wtr.write_record(Self::cells(record))?;
        }
        wtr.flush().context("Failed to flush CSV output")?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize result table")
    }

    /// Fixed-width rendering for the terminal.
    pub fn format_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<8} {:<8} {:>16} {:>14} {:>14} {:>16} {:>14} {:>14}",
            COLUMNS[0], COLUMNS[1], COLUMNS[2], COLUMNS[3], COLUMNS[4], COLUMNS[5], COLUMNS[6], COLUMNS[7]
        );
        let _ = writeln!(out, "{:-<111}", "");

        let fixed = |value: Option<f64>, precision: usize| {
            value.map_or_else(|| UNDEFINED.to_string(), |v| format!("{:.*}", precision, v))
        };
        for record in &self.rows {
            let motion = record.motion;
            let _ = writeln!(
                out,
                "{:<8} {:<8} {:>16.3} {:>14} {:>14} {:>16.3} {:>14} {:>14}",
                record.source,
                record.capture,
                record.centroid_x,
                fixed(motion.map(|m| m.movement_x), 3),
                fixed(motion.map(|m| m.rate_x), 4),
                record.centroid_y,
                fixed(motion.map(|m| m.movement_y), 3),
                fixed(motion.map(|m| m.rate_y), 4),
            );
        }

        if !self.summaries.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "{:<8} {:>10} {:>12} {:>14} {:>14} {:>14} {:>14}",
                "Source", "Captures", "Elapsed (s)", "Net X (\")", "Net Y (\")", "Mean X (\"/s)", "Mean Y (\"/s)"
            );
            let _ = writeln!(out, "{:-<92}", "");
            for summary in &self.summaries {
                let _ = writeln!(
                    out,
                    "{:<8} {:>10} {:>12.1} {:>14.3} {:>14.3} {:>14.4} {:>14.4}",
                    summary.source,
                    summary.captures,
                    summary.elapsed_seconds,
                    summary.net_movement_x,
                    summary.net_movement_y,
                    summary.mean_rate_x,
                    summary.mean_rate_y,
                );
            }
        }

        for warning in &self.jump_warnings {
            let _ = writeln!(
                out,
                "warning: source {} jumped {:.1} px at capture {}",
                warning.track, warning.step_px, warning.capture
            );
        }
        for warning in &self.cadence_warnings {
            let _ = writeln!(
                out,
                "warning: capture {} arrived {:.1}s after the previous one, expected {:.1}s",
                warning.capture, warning.observed_seconds, warning.expected_seconds
            );
        }
        out
    }
}
