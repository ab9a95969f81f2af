use anyhow::{Context, Result};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, ImageBuffer, ImageEncoder, Rgb};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::dao_star_detection::DetectedSource;
use crate::image_analysis::Exposure;
use crate::mtf_stretch::{stretch_to_u8, StretchParameters};

/// Colour of the brightest source; the rest use `SOURCE_COLOR`
const PRIMARY_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const SOURCE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Stretched greyscale rendering of the exposure with a circle around each source.
pub fn render_annotated(
    exposure: &Exposure,
    sources: &[DetectedSource],
    fwhm: f64,
) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
    let stats = exposure.calculate_statistics();
    let stretched = stretch_to_u8(&exposure.data, &stats, &StretchParameters::default());

    let mut rgb_image = ImageBuffer::<Rgb<u8>, Vec<u8>>::new(exposure.width as u32, exposure.height as u32);
    for (x, y, pixel) in rgb_image.enumerate_pixels_mut() {
        let value = stretched[y as usize * exposure.width + x as usize];
        *pixel = Rgb([value, value, value]);
    }

    let radius = (fwhm * 1.5).max(5.0) as i32;
    for (i, source) in sources.iter().enumerate() {
        let color = if i == 0 { PRIMARY_COLOR } else { SOURCE_COLOR };
        let center = (source.x.round() as i32, source.y.round() as i32);
        draw_hollow_circle_mut(&mut rgb_image, center, radius, color);
        if radius < 8 {
            draw_filled_circle_mut(&mut rgb_image, center, 1, color);
        }
    }
    rgb_image
}

/// Write the annotated exposure as a PNG.
pub fn write_annotated_png(
    exposure: &Exposure,
    sources: &[DetectedSource],
    fwhm: f64,
    output_path: &Path,
) -> Result<()> {
    let rgb_image = render_annotated(exposure, sources, fwhm);

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;
    let writer = BufWriter::new(file);
    let encoder = PngEncoder::new_with_quality(writer, CompressionType::Best, FilterType::Adaptive);

    encoder
        .write_image(
            &rgb_image,
            rgb_image.width(),
            rgb_image.height(),
            ColorType::Rgb8.into(),
        )
        .with_context(|| format!("Failed to write PNG image to {}", output_path.display()))?;
    Ok(())
}
