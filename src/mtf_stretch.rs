/// Midtone Transfer Function (MTF) display stretch
use crate::image_analysis::ImageStatistics;

/// MAD to sigma conversion factor
const MAD_TO_SIGMA: f64 = 1.4826;

pub struct StretchParameters {
    /// Target histogram median position
    pub factor: f64,
    /// Shadow clipping in MAD units
    pub black_clipping: f64,
}

impl Default for StretchParameters {
    fn default() -> Self {
        Self {
            factor: 0.2,
            black_clipping: -2.8,
        }
    }
}

/// Stretch a frame to 8-bit grey levels. Samples are normalized against the
/// frame's own min/max range.
pub fn stretch_to_u8(data: &[f64], statistics: &ImageStatistics, params: &StretchParameters) -> Vec<u8> {
    let range = statistics.max - statistics.min;
    if !(range > 0.0) {
        return vec![0; data.len()];
    }
    let normalize = |value: f64| ((value - statistics.min) / range).clamp(0.0, 1.0);

    let normalized_median = normalize(statistics.median);
    let normalized_mad = statistics.mad / range;

    let (shadows, midtones, highlights) = if normalized_median > 0.5 {
        let shadows = 0.0;
        let highlights = normalized_median - params.black_clipping * normalized_mad * MAD_TO_SIGMA;
        let midtones = midtones_transfer_function(params.factor, 1.0 - (highlights - normalized_median));
        (shadows, midtones, highlights)
    } else {
        let shadows = normalized_median + params.black_clipping * normalized_mad * MAD_TO_SIGMA;
        let midtones = midtones_transfer_function(params.factor, normalized_median - shadows);
        (shadows, midtones, 1.0)
    };

    data.iter()
        .map(|&pixel| {
            let input = (1.0 - highlights + normalize(pixel) - shadows).clamp(0.0, 1.0);
            (midtones_transfer_function(midtones, input) * 255.0).round() as u8
        })
        .collect()
}

fn midtones_transfer_function(midtone_balance: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    (midtone_balance - 1.0) * x / ((2.0 * midtone_balance - 1.0) * x - midtone_balance)
}
