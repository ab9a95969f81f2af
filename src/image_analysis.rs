use bumpalo::Bump;
use chrono::NaiveDateTime;

use crate::error::{DriftError, Result};
use crate::optics::PixelPitch;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ImageStatistics {
    pub width: usize,
    pub height: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub mad: f64,
}

/// One frame of the capture sequence: a row-major intensity grid plus the
/// metadata needed to turn pixel motion into angular motion.
#[derive(Debug, Clone)]
pub struct Exposure {
    /// 1-based position in capture order
    pub capture: usize,
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
    pub pixel_pitch: PixelPitch,
    pub timestamp: Option<NaiveDateTime>,
}

impl Exposure {
    pub fn new(
        capture: usize,
        width: usize,
        height: usize,
        data: Vec<f64>,
        pixel_pitch: PixelPitch,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DriftError::MalformedExposure {
                exposure: capture,
                reason: format!("empty image {}x{}", width, height),
            });
        }
        if data.len() != width * height {
            return Err(DriftError::MalformedExposure {
                exposure: capture,
                reason: format!(
                    "data size mismatch: expected {} pixels, got {}",
                    width * height,
                    data.len()
                ),
            });
        }
        if let Some(idx) = data.iter().position(|v| !v.is_finite()) {
            return Err(DriftError::MalformedExposure {
                exposure: capture,
                reason: format!(
                    "non-finite sample at ({}, {})",
                    idx % width,
                    idx / width
                ),
            });
        }

        Ok(Self {
            capture,
            width,
            height,
            data,
            pixel_pitch,
            timestamp: None,
        })
    }

    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    /// Mean, median, spread and MAD of every sample in the frame.
    pub fn calculate_statistics(&self) -> ImageStatistics {
        // Use arena for temporary allocation
        let arena = Bump::new();
        let mut sorted_data = bumpalo::vec![in &arena];
        sorted_data.extend_from_slice(&self.data);

        let n = sorted_data.len() as f64;
        let mean = sorted_data.iter().sum::<f64>() / n;
        let variance = if sorted_data.len() > 1 {
            sorted_data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)
        } else {
            0.0
        };

        let min = sorted_data.iter().copied().fold(f64::INFINITY, f64::min);
        let max = sorted_data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let median = median_in_place(&mut sorted_data);

        let mut deviations = bumpalo::vec![in &arena];
        deviations.extend(self.data.iter().map(|&x| (x - median).abs()));
        let mad = median_in_place(&mut deviations);

        ImageStatistics {
            width: self.width,
            height: self.height,
            mean,
            median,
            std_dev: variance.sqrt(),
            min,
            max,
            mad,
        }
    }
}

/// Median by partial selection; reorders `values`. Returns 0 for an empty slice.
pub fn median_in_place(values: &mut [f64]) -> f64 {
    let len = values.len();
    if len == 0 {
        return 0.0;
    }

    let mid = len / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    let upper = *upper;
    if len % 2 == 1 {
        upper
    } else {
        let lower_max = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (lower_max + upper) / 2.0
    }
}
