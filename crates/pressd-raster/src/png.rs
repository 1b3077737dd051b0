// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PNG ingest: decode, rotate to the requested orientation, scale into the
// printer's imageable box, then 1-bit-per-pixel ordered dither. The
// per-pixel loop below follows the same manual-channel-walk style used
// elsewhere in this codebase for brightness/contrast adjustment — a
// tight loop over raw sample buffers rather than an abstraction layered
// over `DynamicImage`.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage};
use pressd_core::CoreError;
use tracing::instrument;

use crate::driver::{Driver, Orientation, PrintOptions};

/// 16-row Bayer-style ordered-dither threshold matrix, values 0..255.
pub const DITHER_MATRIX: [[u8; 16]; 16] = build_dither_matrix();

const fn build_dither_matrix() -> [[u8; 16]; 16] {
    let mut matrix = [[0u8; 16]; 16];
    let mut y = 0;
    while y < 16 {
        let mut x = 0;
        while x < 16 {
            matrix[y][x] = bayer_value(x as u32, y as u32, 16) as u8;
            x += 1;
        }
        y += 1;
    }
    matrix
}

/// Recursive Bayer matrix value at `(x, y)` for an `n x n` matrix (n a
/// power of two). For `n = 16` this spans exactly `0..=255`.
const fn bayer_value(x: u32, y: u32, n: u32) -> u32 {
    if n == 1 {
        return 0;
    }
    let half = n / 2;
    let sub = bayer_value(x % half, y % half, half);
    let quadrant = if y < half {
        if x < half {
            0
        } else {
            2
        }
    } else if x < half {
        3
    } else {
        1
    };
    sub * 4 + quadrant
}

/// Decode PNG bytes to an 8-bit grayscale image with a white background
/// composited under any alpha channel.
#[instrument(skip(bytes))]
pub fn decode_gray(bytes: &[u8]) -> Result<GrayImage, CoreError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| CoreError::DocumentUnprintable(format!("PNG decode failed: {e}")))?;
    Ok(flatten_to_gray(&img))
}

fn flatten_to_gray(img: &DynamicImage) -> GrayImage {
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let mut out = GrayImage::new(w, h);
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let alpha = a as f32 / 255.0;
        // Composite onto white, then standard luma weights.
        let r = r as f32 * alpha + 255.0 * (1.0 - alpha);
        let g = g as f32 * alpha + 255.0 * (1.0 - alpha);
        let b = b as f32 * alpha + 255.0 * (1.0 - alpha);
        let gray = (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
        out.put_pixel(x, y, image::Luma([gray]));
    }
    out
}

/// Rotate a grayscale image by the orientation's degrees (fast-path
/// 90/180/270, no general rotation needed since these are axis-aligned).
pub fn rotate(img: &GrayImage, orientation: Orientation) -> GrayImage {
    match orientation.degrees() {
        90 => image::imageops::rotate90(img),
        180 => image::imageops::rotate180(img),
        270 => image::imageops::rotate270(img),
        _ => img.clone(),
    }
}

/// Scale `img` to fit inside `(width, height)` preserving aspect ratio.
pub fn scale_to_fit(img: &GrayImage, width: u32, height: u32) -> GrayImage {
    let (src_w, src_h) = img.dimensions();
    if src_w == 0 || src_h == 0 || width == 0 || height == 0 {
        return img.clone();
    }
    let scale = (width as f64 / src_w as f64).min(height as f64 / src_h as f64);
    let out_w = ((src_w as f64 * scale).round() as u32).max(1);
    let out_h = ((src_h as f64 * scale).round() as u32).max(1);
    image::imageops::resize(img, out_w, out_h, FilterType::Lanczos3)
}

/// Pack one output row of `src_row` (grayscale samples, 0=black..255=white)
/// into 1-bit-per-pixel MSB-first bytes using the ordered-dither threshold
/// row for `y`, walking the source with Bresenham-style horizontal error
/// accumulation when `src_width != out_width`.
pub fn dither_row(src_row: &[u8], out_width: u32, y: u32) -> Vec<u8> {
    let threshold_row = &DITHER_MATRIX[(y & 15) as usize];
    let src_width = src_row.len() as u32;
    let out_bytes = out_width.div_ceil(8) as usize;
    let mut out = vec![0u8; out_bytes];

    let mut xerr: i64 = 0;
    let mut src_x: u32 = 0;
    for out_x in 0..out_width {
        let sample = if src_width == out_width {
            src_row[out_x as usize]
        } else {
            src_row[(src_x as usize).min(src_row.len().saturating_sub(1))]
        };
        let threshold = threshold_row[(out_x & 15) as usize];
        // 0 = black ink. Sample below threshold => print a dot.
        if sample <= threshold {
            out[(out_x / 8) as usize] |= 0x80 >> (out_x % 8);
        }

        if src_width != out_width {
            xerr += src_width as i64;
            while xerr >= out_width as i64 {
                xerr -= out_width as i64;
                src_x += 1;
            }
        }
    }
    out
}

/// Drive a full PNG-sourced page through the dithering pipeline and the
/// driver callbacks. `copies` > 1 repeats `rstartpage`/`rwrite`/`rendpage`
/// per the driver contract; `rstartjob`/`rendjob` bracket all copies.
#[instrument(skip(bytes, driver))]
pub fn process_png(bytes: &[u8], options: &PrintOptions, driver: &mut dyn Driver) -> Result<(), CoreError> {
    let gray = decode_gray(bytes)?;
    let rotated = rotate(&gray, options.orientation);
    let (left, top, box_w, box_h) = options.imageable_box();
    let scaled = scale_to_fit(&rotated, box_w, box_h);
    let (scaled_w, scaled_h) = scaled.dimensions();

    if !driver.rstartjob(options) {
        return Err(CoreError::DocumentUnprintable("driver rejected rstartjob".into()));
    }

    for copy in 0..options.copies.max(1) {
        if !driver.rstartpage(options, copy) {
            return Err(CoreError::DocumentUnprintable("driver rejected rstartpage".into()));
        }

        let total_h = top + box_h;
        for y in 0..total_h {
            let row_bytes = if y < top || y >= top + scaled_h {
                vec![0u8; box_w.div_ceil(8) as usize]
            } else {
                let src_y = y - top;
                let row: Vec<u8> = (0..scaled_w).map(|x| *scaled.get_pixel(x, src_y).0.first().unwrap_or(&255)).collect();
                let mut padded = vec![255u8; left as usize];
                padded.extend_from_slice(&row);
                dither_row(&padded, box_w, y)
            };
            if !driver.rwrite(options, y, &row_bytes) {
                return Err(CoreError::DocumentUnprintable("driver rejected rwrite".into()));
            }
        }

        if !driver.rendpage(options, copy) {
            return Err(CoreError::DocumentUnprintable("driver rejected rendpage".into()));
        }
    }

    if !driver.rendjob(options) {
        return Err(CoreError::DocumentUnprintable("driver rejected rendjob".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dither_matrix_spans_full_range() {
        let mut values: Vec<u8> = DITHER_MATRIX.iter().flatten().copied().collect();
        values.sort_unstable();
        values.dedup();
        assert!(values.len() > 1, "matrix should not be constant");
    }

    #[test]
    fn all_white_row_dithers_to_all_zero_bits() {
        let row = vec![255u8; 32];
        let packed = dither_row(&row, 32, 0);
        assert!(packed.iter().all(|&b| b == 0));
    }

    #[test]
    fn all_black_row_dithers_to_all_set_bits() {
        let row = vec![0u8; 32];
        let packed = dither_row(&row, 32, 0);
        assert!(packed.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn dither_row_output_length_matches_width() {
        let row = vec![128u8; 17];
        let packed = dither_row(&row, 17, 3);
        assert_eq!(packed.len(), 17_u32.div_ceil(8) as usize);
    }

    #[test]
    fn scale_to_fit_preserves_aspect_ratio() {
        let img = GrayImage::new(200, 100);
        let scaled = scale_to_fit(&img, 50, 50);
        let (w, h) = scaled.dimensions();
        assert_eq!(w, 50);
        assert_eq!(h, 25);
    }

    #[test]
    fn rotate_90_swaps_dimensions() {
        let img = GrayImage::new(40, 20);
        let rotated = rotate(&img, Orientation::Landscape);
        assert_eq!(rotated.dimensions(), (20, 40));
    }
}
