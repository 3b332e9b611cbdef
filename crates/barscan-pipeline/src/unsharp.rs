//! Unsharp masking with a box blur.
//!
//! Camera frames of a close-up barcode are often slightly out of focus.
//! Subtracting a blurred copy isolates the high-frequency residual, and
//! adding it back (scaled by `amount`) steepens bar edges before
//! decoding.

use image::{GrayImage, Luma, Rgba};

use crate::types::PixelBuffer;
use crate::window::{clamp_to_edge, offsets};

/// Box blur of the R channel over a `(2r+1)²` window with clamp-to-edge
/// boundaries, each mean rounded to the nearest level.
#[must_use = "returns the blurred luminance"]
pub fn box_blur(image: &PixelBuffer, radius: u32) -> GrayImage {
    let (w, h) = image.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    let side = 2 * u64::from(radius) + 1;
    #[allow(clippy::cast_precision_loss)]
    let area = (side * side) as f64;

    for y in 0..h {
        for x in 0..w {
            let mut sum = 0u64;
            for dy in offsets(radius) {
                let ny = clamp_to_edge(y, dy, h);
                for dx in offsets(radius) {
                    let nx = clamp_to_edge(x, dx, w);
                    sum += u64::from(image.get_pixel(nx, ny).0[0]);
                }
            }
            #[allow(
                clippy::cast_precision_loss,
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss
            )]
            let mean = (sum as f64 / area).round().min(255.0) as u8;
            out.put_pixel(x, y, Luma([mean]));
        }
    }

    out
}

/// Sharpen with `clamp(round(v + amount * (v - blurred)), 0, 255)`.
///
/// Only R is read. On a raw color frame that makes R a luminance proxy,
/// which matches how the enhancement pre-pass is used ahead of
/// grayscale conversion. Output has R = G = B and alpha 255.
#[must_use = "returns the sharpened buffer"]
pub fn unsharp_mask(image: &PixelBuffer, radius: u32, amount: f64) -> PixelBuffer {
    let (w, h) = image.dimensions();
    let blurred = box_blur(image, radius);

    PixelBuffer::from_fn(w, h, |x, y| {
        let v = f64::from(image.get_pixel(x, y).0[0]);
        let b = f64::from(blurred.get_pixel(x, y).0[0]);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let s = amount.mul_add(v - b, v).round().clamp(0.0, 255.0) as u8;
        Rgba([s, s, s, 255])
    })
}
