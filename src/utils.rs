use anyhow::{bail, Context, Result};
use chrono::NaiveDate;

pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let keep: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", keep)
    }
}

/// `<object>_<YYYYMMDD>.csv`, with the date checked to be a real calendar day.
pub fn output_file_name(object: &str, date: &str) -> Result<String> {
    let object = object.trim();
    if object.is_empty() {
        bail!("Object name must not be empty");
    }
    if object.contains(['/', '\\']) {
        bail!("Object name '{}' must not contain path separators", object);
    }
    let date = NaiveDate::parse_from_str(date.trim(), "%Y%m%d")
        .with_context(|| format!("Invalid capture date '{}', expected YYYYMMDD", date))?;
    Ok(format!("{}_{}.csv", object, date.format("%Y%m%d")))
}
