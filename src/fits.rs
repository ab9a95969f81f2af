/// FITS exposure loading
use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use fitrs::{Fits, FitsData, FitsDataArray, Hdu, HeaderValue};
use std::path::Path;
use tracing::debug;

use crate::image_analysis::Exposure;
use crate::optics::PixelPitch;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

fn header_f64(hdu: &Hdu, key: &str) -> Option<f64> {
    match hdu.value(key)? {
        HeaderValue::IntegerNumber(n) => Some(*n as f64),
        HeaderValue::RealFloatingNumber(f) => Some(*f),
        _ => None,
    }
}

fn header_usize(hdu: &Hdu, key: &str) -> Result<usize> {
    match hdu.value(key) {
        Some(HeaderValue::IntegerNumber(n)) if *n >= 0 => Ok(*n as usize),
        Some(_) => bail!("{} is not a non-negative integer", key),
        None => bail!("Missing {} header", key),
    }
}

/// DATE-OBS as a naive UTC timestamp. A bare date maps to midnight.
pub fn parse_date_obs(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Load the primary HDU as exposure `capture`. BZERO/BSCALE are applied and
/// the pixel pitch comes from XPIXSZ/YPIXSZ; DATE-OBS is optional.
pub fn load_exposure(path: &Path, capture: usize) -> Result<Exposure> {
    let fits = Fits::open(path)
        .with_context(|| format!("Failed to open FITS file: {}", path.display()))?;
    let hdu = fits
        .get(0)
        .ok_or_else(|| anyhow!("No primary HDU found in {}", path.display()))?;

    let naxis = header_usize(&hdu, "NAXIS")?;
    if naxis < 2 {
        bail!(
            "{} does not contain 2D image data (NAXIS={})",
            path.display(),
            naxis
        );
    }
    let width = header_usize(&hdu, "NAXIS1")?;
    let height = header_usize(&hdu, "NAXIS2")?;

    let bzero = header_f64(&hdu, "BZERO").unwrap_or(0.0);
    let bscale = header_f64(&hdu, "BSCALE").unwrap_or(1.0);

    let pitch_x = header_f64(&hdu, "XPIXSZ")
        .ok_or_else(|| anyhow!("Missing XPIXSZ (pixel pitch) in {}", path.display()))?;
    let pitch_y = header_f64(&hdu, "YPIXSZ").unwrap_or(pitch_x);

    let timestamp = match hdu.value("DATE-OBS") {
        Some(HeaderValue::CharacterString(s)) => parse_date_obs(s),
        _ => None,
    };

    let physical = |raw: f64| bzero + bscale * raw;
    let fits_data = hdu.read_data();
    let mut data: Vec<f64> = match fits_data {
        FitsData::Characters(_) => {
            bail!("{} contains character data, not image data", path.display());
        }
        FitsData::IntegersI32(FitsDataArray { data, .. }) => data
            .iter()
            .map(|&x| x.map_or(f64::NAN, |v| physical(v as f64)))
            .collect(),
        FitsData::IntegersU32(FitsDataArray { data, .. }) => data
            .iter()
            .map(|&x| x.map_or(f64::NAN, |v| physical(v as f64)))
            .collect(),
        FitsData::FloatingPoint32(FitsDataArray { data, .. }) => {
            data.iter().map(|&x| physical(x as f64)).collect()
        }
        FitsData::FloatingPoint64(FitsDataArray { data, .. }) => {
            data.iter().map(|&x| physical(x)).collect()
        }
    };
    // Higher axes (e.g. a single-plane cube) keep only the first plane
    data.truncate(width * height);

    debug!(
        path = %path.display(),
        capture,
        width,
        height,
        pitch_x,
        pitch_y,
        ?timestamp,
        "loaded exposure"
    );

    let exposure = Exposure::new(capture, width, height, data, PixelPitch::new(pitch_x, pitch_y))
        .with_context(|| format!("Invalid image data in {}", path.display()))?;
    Ok(match timestamp {
        Some(ts) => exposure.with_timestamp(ts),
        None => exposure,
    })
}
