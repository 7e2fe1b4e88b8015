//! Image preparation for OCR.
//!
//! Small digit labels on busy backgrounds read poorly raw, so count
//! re-reads run over several binarized and upscaled variants and vote on
//! the results.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};

use crate::capture::Frame;

/// Flattens a captured frame to grayscale.
pub fn to_gray(frame: &Frame) -> GrayImage {
    imageops::grayscale(frame)
}

/// Mean-adaptive threshold, inverted: pixels brighter than their local
/// neighborhood mean (minus `offset`) become black text on white.
pub fn adaptive_threshold_inverted(gray: &GrayImage, block: u32, offset: i16) -> GrayImage {
    let (width, height) = gray.dimensions();
    let half = (block / 2) as i64;
    let mut output = GrayImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let mut sum: u64 = 0;
            let mut count: u64 = 0;
            for dy in -half..=half {
                for dx in -half..=half {
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx >= 0 && ny >= 0 && (nx as u32) < width && (ny as u32) < height {
                        sum += gray.get_pixel(nx as u32, ny as u32)[0] as u64;
                        count += 1;
                    }
                }
            }
            let mean = (sum / count.max(1)) as i16;
            let value = if gray.get_pixel(x, y)[0] as i16 > mean - offset {
                0u8
            } else {
                255u8
            };
            output.put_pixel(x, y, Luma([value]));
        }
    }
    output
}

/// Otsu global threshold, inverted.
pub fn otsu_threshold_inverted(gray: &GrayImage) -> GrayImage {
    let threshold = otsu_level(gray);
    let (width, height) = gray.dimensions();
    let mut output = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let value = if gray.get_pixel(x, y)[0] > threshold { 0u8 } else { 255u8 };
            output.put_pixel(x, y, Luma([value]));
        }
    }
    output
}

/// Otsu's method: the threshold maximizing between-class variance.
fn otsu_level(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for px in gray.pixels() {
        histogram[px[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 127;
    }

    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_bg = 0.0f64;
    let mut weight_bg = 0u64;
    let mut best_threshold = 0u8;
    let mut best_variance = 0.0f64;

    for t in 0..256usize {
        weight_bg += histogram[t];
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += t as f64 * histogram[t] as f64;

        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let variance =
            weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg) * (mean_bg - mean_fg);
        if variance > best_variance {
            best_variance = variance;
            best_threshold = t as u8;
        }
    }
    best_threshold
}

/// 2x upscale; small digits gain enough stroke width to resolve.
pub fn upscale_2x(gray: &GrayImage) -> GrayImage {
    imageops::resize(
        gray,
        gray.width() * 2,
        gray.height() * 2,
        FilterType::CatmullRom,
    )
}

/// Crops the rightmost `fraction` of the image, where count labels sit.
pub fn crop_right_fraction(gray: &GrayImage, fraction: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let band_width = ((width as f32 * fraction) as u32).clamp(1, width);
    let x0 = width - band_width;
    imageops::crop_imm(gray, x0, 0, band_width, height).to_image()
}

/// The variant set re-read during count extraction, cheapest first.
pub fn band_variants(gray: &GrayImage) -> Vec<GrayImage> {
    vec![
        gray.clone(),
        adaptive_threshold_inverted(gray, 11, 2),
        otsu_threshold_inverted(gray),
        upscale_2x(gray),
    ]
}
