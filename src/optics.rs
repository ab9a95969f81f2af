/// Instrument catalog and pixel-to-angle conversion
use serde::{Deserialize, Serialize};

use crate::error::{DriftError, Result};

/// A telescope in the instrument catalog. Focal length shares its unit basis
/// with the pixel pitch recorded in the exposure headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentProfile {
    pub name: String,
    pub focal_length: f64,
}

impl InstrumentProfile {
    pub fn new(name: impl Into<String>, focal_length: f64) -> Self {
        Self {
            name: name.into(),
            focal_length,
        }
    }
}

/// Default catalog: the observatory's main scope and its finder.
pub fn default_instruments() -> Vec<InstrumentProfile> {
    vec![
        InstrumentProfile::new("Main Scope", 6500.0),
        InstrumentProfile::new("Finderscope", 1140.0),
    ]
}

/// Look up an instrument by name (case-insensitive) or by its 1-based
/// position in the catalog.
pub fn select_instrument<'a>(
    catalog: &'a [InstrumentProfile],
    selection: &str,
) -> Result<&'a InstrumentProfile> {
    let selection = selection.trim();

    let found = match selection.parse::<usize>() {
        Ok(number) if number >= 1 => catalog.get(number - 1),
        Ok(_) => None,
        Err(_) => catalog
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(selection)),
    };

    found.ok_or_else(|| DriftError::UnknownInstrument {
        name: selection.to_string(),
        available: catalog
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Physical pixel size along each detector axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPitch {
    pub x: f64,
    pub y: f64,
}

impl PixelPitch {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn square(size: f64) -> Self {
        Self { x: size, y: size }
    }
}

/// Angular size of one pixel along each axis, in arcseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OpticalScale {
    pub arcsec_per_pixel_x: f64,
    pub arcsec_per_pixel_y: f64,
}

impl OpticalScale {
    /// `pitch / focal_length * scale_constant` per axis.
    ///
    /// The observatory's reduction uses 3600 as the constant. That only
    /// yields true arcseconds for a particular pairing of pitch and focal
    /// length units; a strict small-angle conversion would use 206265 with
    /// both quantities in the same unit. The constant is a parameter so the
    /// two can be compared against known instrument values.
    pub fn from_instrument(
        profile: &InstrumentProfile,
        pitch: PixelPitch,
        scale_constant: f64,
    ) -> Result<Self> {
        if !profile.focal_length.is_finite() || profile.focal_length <= 0.0 {
            return Err(DriftError::InvalidFocalLength {
                instrument: profile.name.clone(),
                focal_length: profile.focal_length,
            });
        }
        for (name, value) in [("pixel pitch x", pitch.x), ("pixel pitch y", pitch.y)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(DriftError::InvalidParameter {
                    name,
                    reason: format!("must be positive, got {}", value),
                });
            }
        }
        if !scale_constant.is_finite() || scale_constant <= 0.0 {
            return Err(DriftError::InvalidParameter {
                name: "scale_constant",
                reason: format!("must be positive, got {}", scale_constant),
            });
        }

        Ok(Self {
            arcsec_per_pixel_x: pitch.x / profile.focal_length * scale_constant,
            arcsec_per_pixel_y: pitch.y / profile.focal_length * scale_constant,
        })
    }

    /// Convert a pixel displacement to arcseconds.
    pub fn to_arcsec(&self, dx: f64, dy: f64) -> (f64, f64) {
        (dx * self.arcsec_per_pixel_x, dy * self.arcsec_per_pixel_y)
    }
}
