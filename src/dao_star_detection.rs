/// DAOFIND-style point source detection
///
/// The frame is convolved with a zero-sum, truncated Gaussian matched to the
/// expected star FWHM. Local maxima of the convolved image above the effective
/// threshold become candidates; each candidate is measured on the raw frame
/// (sharpness, roundness, sky-subtracted peak, local background) and its
/// centroid is refined with an iterative Gaussian-windowed first moment.
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DriftError, Result};
use crate::image_analysis::{median_in_place, Exposure, ImageStatistics};

/// sigma = FWHM / (2 * sqrt(2 ln 2))
const FWHM_TO_SIGMA: f64 = 0.424_660_900_144_009_5;

/// Centroid iteration limits
const CENTROID_MAX_ITERATIONS: usize = 20;
const CENTROID_TOLERANCE: f64 = 1e-4;

/// How the per-frame detection threshold is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// Use the frame's own median intensity
    FrameMedian,
    /// Use the same value for every frame
    Fixed(f64),
}

impl ThresholdPolicy {
    pub fn threshold_for(&self, stats: &ImageStatistics) -> f64 {
        match *self {
            ThresholdPolicy::FrameMedian => stats.median,
            ThresholdPolicy::Fixed(value) => value,
        }
    }
}

/// Detector parameters. Defaults match the observatory's tracking runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaoParams {
    pub threshold: ThresholdPolicy,
    /// Expected stellar FWHM in pixels
    pub fwhm: f64,
    /// Kernel truncation radius in units of Gaussian sigma
    pub sigma_radius: f64,
    /// Assumed sky level subtracted from reported peaks
    pub sky: f64,
    /// Drop peaks closer to the edge than the kernel half-size
    pub exclude_border: bool,
    /// Keep only this many sources, brightest first
    pub brightest: Option<usize>,
    /// Drop sources whose sky-subtracted peak exceeds this value
    pub peak_max: Option<f64>,
    /// Inclusive sharpness bounds
    pub sharpness: (f64, f64),
    /// Inclusive roundness bounds
    pub roundness: (f64, f64),
}

impl Default for DaoParams {
    fn default() -> Self {
        Self {
            threshold: ThresholdPolicy::FrameMedian,
            fwhm: 20.0,
            sigma_radius: 1.5,
            sky: 300.0,
            exclude_border: true,
            brightest: Some(10),
            peak_max: Some(70000.0),
            sharpness: (0.2, 1.0),
            roundness: (-1.0, 1.0),
        }
    }
}

impl DaoParams {
    pub fn validate(&self) -> Result<()> {
        let invalid = |name: &'static str, reason: String| DriftError::InvalidParameter { name, reason };

        if !self.fwhm.is_finite() || self.fwhm <= 0.0 {
            return Err(invalid("fwhm", format!("must be positive, got {}", self.fwhm)));
        }
        if !self.sigma_radius.is_finite() || self.sigma_radius <= 0.0 {
            return Err(invalid(
                "sigma_radius",
                format!("must be positive, got {}", self.sigma_radius),
            ));
        }
        if !self.sky.is_finite() {
            return Err(invalid("sky", format!("must be finite, got {}", self.sky)));
        }
        if let ThresholdPolicy::Fixed(value) = self.threshold {
            if !value.is_finite() {
                return Err(invalid("threshold", format!("must be finite, got {}", value)));
            }
        }
        if self.brightest == Some(0) {
            return Err(invalid("brightest", "must be at least 1".to_string()));
        }
        if let Some(peak_max) = self.peak_max {
            if peak_max.is_nan() {
                return Err(invalid("peak_max", "must not be NaN".to_string()));
            }
        }
        if !(self.sharpness.0 <= self.sharpness.1) {
            return Err(invalid(
                "sharpness",
                format!("lower bound {} above upper bound {}", self.sharpness.0, self.sharpness.1),
            ));
        }
        if !(self.roundness.0 <= self.roundness.1) {
            return Err(invalid(
                "roundness",
                format!("lower bound {} above upper bound {}", self.roundness.0, self.roundness.1),
            ));
        }
        Ok(())
    }
}

/// A candidate point source in one exposure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedSource {
    /// 1-based rank in the detector output (descending peak)
    pub rank: usize,
    pub x: f64,
    pub y: f64,
    /// Peak pixel value minus the assumed sky
    pub peak: f64,
    /// Median of the annulus around the source
    pub background: f64,
    /// Background-subtracted sum over the kernel footprint
    pub flux: f64,
    pub sharpness: f64,
    pub roundness: f64,
}

/// Detector output for one exposure.
#[derive(Debug, Clone)]
pub struct SourceDetection {
    pub capture: usize,
    pub threshold: f64,
    pub statistics: ImageStatistics,
    pub sources: Vec<DetectedSource>,
}

/// Zero-sum Gaussian kernel truncated to an elliptical footprint.
#[derive(Debug, Clone)]
struct DaoKernel {
    half: usize,
    sigma: f64,
    /// (dx, dy, weight) for every footprint pixel
    taps: Vec<(isize, isize, f64)>,
    /// Convolution of a unit-amplitude star with this kernel gives 1; noise
    /// in the convolved image scales by this factor
    relerr: f64,
}

impl DaoKernel {
    fn new(fwhm: f64, sigma_radius: f64) -> Self {
        let sigma = fwhm * FWHM_TO_SIGMA;
        let half = ((sigma_radius * sigma).floor() as usize).max(2);
        let limit_sq = (sigma_radius * sigma).powi(2);
        let h = half as isize;

        let mut footprint = Vec::new();
        for dy in -h..=h {
            for dx in -h..=h {
                let r2 = (dx * dx + dy * dy) as f64;
                if r2 <= limit_sq || r2 <= 4.0 {
                    let g = (-r2 / (2.0 * sigma * sigma)).exp();
                    footprint.push((dx, dy, g));
                }
            }
        }

        let n = footprint.len() as f64;
        let sum: f64 = footprint.iter().map(|t| t.2).sum();
        let sum_sq: f64 = footprint.iter().map(|t| t.2 * t.2).sum();
        let denom = sum_sq - sum * sum / n;
        let mean = sum / n;

        let taps = footprint
            .into_iter()
            .map(|(dx, dy, g)| (dx, dy, (g - mean) / denom))
            .collect();

        Self {
            half,
            sigma,
            taps,
            relerr: 1.0 / denom.sqrt(),
        }
    }

    /// Convolve the frame; samples beyond the edge repeat the nearest edge pixel.
    fn convolve(&self, data: &[f64], width: usize, height: usize) -> Vec<f64> {
        let max_x = width as isize - 1;
        let max_y = height as isize - 1;
        let mut out = vec![0.0; width * height];

        for y in 0..height {
            for x in 0..width {
                let mut acc = 0.0;
                for &(dx, dy, w) in &self.taps {
                    let sx = (x as isize + dx).clamp(0, max_x) as usize;
                    let sy = (y as isize + dy).clamp(0, max_y) as usize;
                    acc += data[sy * width + sx] * w;
                }
                out[y * width + x] = acc;
            }
        }
        out
    }
}

pub struct DaoStarFinder {
    params: DaoParams,
    kernel: DaoKernel,
}

impl DaoStarFinder {
    pub fn new(params: DaoParams) -> Result<Self> {
        params.validate()?;
        let kernel = DaoKernel::new(params.fwhm, params.sigma_radius);
        Ok(Self { params, kernel })
    }

    pub fn params(&self) -> &DaoParams {
        &self.params
    }

    /// Run detection on one exposure using its own statistics for the threshold.
    pub fn detect(&self, exposure: &Exposure) -> SourceDetection {
        let statistics = exposure.calculate_statistics();
        let threshold = self.params.threshold.threshold_for(&statistics);
        let sources = self.find_sources(&exposure.data, exposure.width, exposure.height, threshold);

        debug!(
            capture = exposure.capture,
            median = statistics.median,
            threshold,
            sources = sources.len(),
            "detected sources"
        );

        SourceDetection {
            capture: exposure.capture,
            threshold,
            statistics,
            sources,
        }
    }

    /// Find sources in a row-major frame. `threshold` is in data units and is
    /// scaled by the kernel's relative error before comparing against the
    /// convolved image.
    pub fn find_sources(
        &self,
        data: &[f64],
        width: usize,
        height: usize,
        threshold: f64,
    ) -> Vec<DetectedSource> {
        if width == 0 || height == 0 || data.len() != width * height {
            return Vec::new();
        }

        let convolved = self.kernel.convolve(data, width, height);
        let effective_threshold = threshold * self.kernel.relerr;
        let peaks = self.find_peaks(&convolved, width, height, effective_threshold);

        let mut rejected_shape = 0;
        let mut rejected_saturated = 0;
        let mut rejected_centroid = 0;

        let mut sources = Vec::new();
        for (px, py) in peaks {
            let Some(source) = self.measure(data, &convolved, width, height, px, py) else {
                rejected_centroid += 1;
                continue;
            };

            if source.sharpness < self.params.sharpness.0
                || source.sharpness > self.params.sharpness.1
                || source.roundness < self.params.roundness.0
                || source.roundness > self.params.roundness.1
            {
                rejected_shape += 1;
                continue;
            }
            if let Some(peak_max) = self.params.peak_max {
                if source.peak > peak_max {
                    rejected_saturated += 1;
                    continue;
                }
            }
            sources.push(source);
        }

        debug!(
            effective_threshold,
            kept = sources.len(),
            rejected_shape,
            rejected_saturated,
            rejected_centroid,
            "peak measurement"
        );

        sources.sort_by(|a, b| b.peak.total_cmp(&a.peak));
        if let Some(brightest) = self.params.brightest {
            sources.truncate(brightest);
        }
        for (i, source) in sources.iter_mut().enumerate() {
            source.rank = i + 1;
        }
        sources
    }

    /// Local maxima of the convolved image over the kernel footprint.
    /// Plateaus resolve to their first pixel in raster order.
    fn find_peaks(
        &self,
        convolved: &[f64],
        width: usize,
        height: usize,
        threshold: f64,
    ) -> Vec<(usize, usize)> {
        let half = self.kernel.half;
        let mut peaks = Vec::new();

        for y in 0..height {
            for x in 0..width {
                if self.params.exclude_border
                    && (x < half || y < half || x + half >= width || y + half >= height)
                {
                    continue;
                }

                let idx = y * width + x;
                let value = convolved[idx];
                if value <= threshold {
                    continue;
                }

                let is_peak = self.kernel.taps.iter().all(|&(dx, dy, _)| {
                    if dx == 0 && dy == 0 {
                        return true;
                    }
                    let nx = x as isize + dx;
                    let ny = y as isize + dy;
                    if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                        return true;
                    }
                    let nidx = ny as usize * width + nx as usize;
                    let neighbor = convolved[nidx];
                    value > neighbor || (value == neighbor && nidx > idx)
                });

                if is_peak {
                    peaks.push((x, y));
                }
            }
        }
        peaks
    }

    fn measure(
        &self,
        data: &[f64],
        convolved: &[f64],
        width: usize,
        height: usize,
        px: usize,
        py: usize,
    ) -> Option<DetectedSource> {
        let conv_peak = convolved[py * width + px];
        let center = data[py * width + px];

        let mut data_max = f64::NEG_INFINITY;
        let mut others_sum = 0.0;
        let mut others_count = 0usize;
        let mut footprint = Vec::with_capacity(self.kernel.taps.len());
        for &(dx, dy, _) in &self.kernel.taps {
            let nx = px as isize + dx;
            let ny = py as isize + dy;
            if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                continue;
            }
            let value = data[ny as usize * width + nx as usize];
            data_max = data_max.max(value);
            footprint.push(value);
            if dx != 0 || dy != 0 {
                others_sum += value;
                others_count += 1;
            }
        }
        if others_count == 0 || conv_peak <= 0.0 {
            return None;
        }
        let sharpness = (center - others_sum / others_count as f64) / conv_peak;

        let window = self.centroid_radius();
        let background = self
            .annulus_background(data, width, height, px, py, window + 1, window + 1 + window.max(3))
            .unwrap_or(self.params.sky);

        let centroid = windowed_centroid(
            data,
            width,
            height,
            (px, py),
            self.kernel.sigma,
            window,
            background,
        )?;

        if (centroid.x - px as f64).abs() > self.kernel.half as f64
            || (centroid.y - py as f64).abs() > self.kernel.half as f64
        {
            return None;
        }

        let flux = footprint.iter().map(|v| v - background).sum();
        let roundness = if centroid.mxx + centroid.myy > 0.0 {
            (centroid.mxx - centroid.myy) / (centroid.mxx + centroid.myy)
        } else {
            0.0
        };

        Some(DetectedSource {
            rank: 0,
            x: centroid.x,
            y: centroid.y,
            peak: data_max - self.params.sky,
            background,
            flux,
            sharpness,
            roundness,
        })
    }

    /// Half-width of the centroiding window: three kernel sigmas.
    fn centroid_radius(&self) -> usize {
        ((3.0 * self.kernel.sigma).ceil() as usize).max(2)
    }

    /// Median of pixels whose distance from the peak lies in [inner, outer).
    fn annulus_background(
        &self,
        data: &[f64],
        width: usize,
        height: usize,
        px: usize,
        py: usize,
        inner: usize,
        outer: usize,
    ) -> Option<f64> {
        let inner_sq = (inner * inner) as isize;
        let outer_sq = (outer * outer) as isize;
        let r = outer as isize;

        let mut ring = Vec::new();
        for dy in -r..=r {
            let ny = py as isize + dy;
            if ny < 0 || ny >= height as isize {
                continue;
            }
            for dx in -r..=r {
                let nx = px as isize + dx;
                if nx < 0 || nx >= width as isize {
                    continue;
                }
                let d2 = dx * dx + dy * dy;
                if d2 >= inner_sq && d2 < outer_sq {
                    ring.push(data[ny as usize * width + nx as usize]);
                }
            }
        }

        if ring.is_empty() {
            None
        } else {
            Some(median_in_place(&mut ring))
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Centroid {
    x: f64,
    y: f64,
    mxx: f64,
    myy: f64,
}

/// Gaussian-windowed first moment, iterated to convergence. For a Gaussian
/// star the fixed point is the true centre regardless of the window width.
fn windowed_centroid(
    data: &[f64],
    width: usize,
    height: usize,
    start: (usize, usize),
    sigma: f64,
    radius: usize,
    background: f64,
) -> Option<Centroid> {
    let inv_two_sigma_sq = 1.0 / (2.0 * sigma * sigma);
    let r = radius as isize;

    let moments = |cx: f64, cy: f64| {
        let ix = cx.round() as isize;
        let iy = cy.round() as isize;
        let (mut sw, mut swx, mut swy, mut swxx, mut swyy) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for yy in (iy - r)..=(iy + r) {
            if yy < 0 || yy >= height as isize {
                continue;
            }
            for xx in (ix - r)..=(ix + r) {
                if xx < 0 || xx >= width as isize {
                    continue;
                }
                let value = (data[yy as usize * width + xx as usize] - background).max(0.0);
                if value == 0.0 {
                    continue;
                }
                let dx = xx as f64 - cx;
                let dy = yy as f64 - cy;
                let w = (-(dx * dx + dy * dy) * inv_two_sigma_sq).exp() * value;
                sw += w;
                swx += w * dx;
                swy += w * dy;
                swxx += w * dx * dx;
                swyy += w * dy * dy;
            }
        }
        (sw, swx, swy, swxx, swyy)
    };

    let mut cx = start.0 as f64;
    let mut cy = start.1 as f64;
    for _ in 0..CENTROID_MAX_ITERATIONS {
        let (sw, swx, swy, _, _) = moments(cx, cy);
        if sw <= 0.0 {
            return None;
        }
        let shift_x = 2.0 * swx / sw;
        let shift_y = 2.0 * swy / sw;
        cx += shift_x;
        cy += shift_y;
        if !cx.is_finite() || !cy.is_finite() {
            return None;
        }
        if shift_x * shift_x + shift_y * shift_y < CENTROID_TOLERANCE * CENTROID_TOLERANCE {
            break;
        }
    }

    let (sw, _, _, swxx, swyy) = moments(cx, cy);
    if sw <= 0.0 {
        return None;
    }
    Some(Centroid {
        x: cx,
        y: cy,
        mxx: swxx / sw,
        myy: swyy / sw,
    })
}
