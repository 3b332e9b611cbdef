//! Binarization: local-mean adaptive threshold and a global cut.
//!
//! Captured frames are rarely lit evenly, so a single global threshold
//! tends to lose one end of a barcode in shadow. The adaptive variant
//! compares every pixel with the mean of its own window instead, using a
//! summed-area table so each mean costs four lookups regardless of the
//! window size.

use image::{GrayImage, Luma, Rgba};
use imageproc::integral_image::integral_image;

use crate::grayscale::is_grayscale;
use crate::types::PixelBuffer;

/// Binarize against the local mean of a `window_size`-wide window.
///
/// The window has half-width `window_size / 2` and is clipped to the
/// buffer, so edge pixels average over fewer samples. A pixel becomes
/// black when `v < mean - c` and white otherwise; every channel,
/// alpha included, is written (alpha = 255).
///
/// Input must already be grayscale; only R is read.
#[must_use = "returns the binarized buffer"]
pub fn adaptive_threshold(image: &PixelBuffer, window_size: u32, c: f64) -> PixelBuffer {
    debug_assert!(
        is_grayscale(image),
        "adaptive_threshold expects grayscale input"
    );

    let (w, h) = image.dimensions();
    let mut out = PixelBuffer::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    let luma = GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y).0[0]]));
    // (w+1)×(h+1); entry (x, y) sums every sample with column < x and row < y.
    let integral = integral_image::<_, u64>(&luma);
    let sat = |x: u32, y: u32| integral.get_pixel(x, y).0[0];

    let half = window_size / 2;
    for y in 0..h {
        let y1 = y.saturating_sub(half);
        let y2 = y.saturating_add(half).min(h - 1);
        for x in 0..w {
            let x1 = x.saturating_sub(half);
            let x2 = x.saturating_add(half).min(w - 1);

            let sum = sat(x2 + 1, y2 + 1) + sat(x1, y1) - sat(x2 + 1, y1) - sat(x1, y2 + 1);
            let count = u64::from(x2 - x1 + 1) * u64::from(y2 - y1 + 1);
            #[allow(clippy::cast_precision_loss)]
            let mean = sum as f64 / count as f64;

            let v = f64::from(image.get_pixel(x, y).0[0]);
            let bit = if v < mean - c { 0 } else { 255 };
            out.put_pixel(x, y, Rgba([bit, bit, bit, 255]));
        }
    }

    out
}

/// Binarize against a single global cut: `v < threshold` becomes black,
/// everything else white.
///
/// Only R, G and B are written; alpha is copied from the input. No
/// integral table is built.
#[must_use = "returns the binarized buffer"]
pub fn global_threshold(image: &PixelBuffer, threshold: f64) -> PixelBuffer {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let bit = if f64::from(pixel.0[0]) < threshold {
            0
        } else {
            255
        };
        pixel.0 = [bit, bit, bit, pixel.0[3]];
    }
    out
}
