//! Sobel edge enhancement.
//!
//! Produces the gradient magnitude of the R channel. Bars of a 1D
//! barcode become pairs of bright lines, which some decoders lock onto
//! more reliably than the raw intensity profile on low-contrast prints.

use image::{GrayImage, Luma, Rgba};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

use crate::grayscale::is_grayscale;
use crate::types::PixelBuffer;

/// Compute `min(255, sqrt(Gx² + Gy²))` with the 3×3 Sobel kernels.
///
/// Only interior pixels (`1..W-1` × `1..H-1`) are computed. The
/// one-pixel border keeps the zeroed value of a fresh buffer
/// (`[0, 0, 0, 0]`, alpha included); it is never extrapolated. Written
/// pixels have R = G = B = magnitude and alpha 255.
///
/// Input must already be grayscale; only R is read.
#[must_use = "returns the edge magnitude buffer"]
pub fn sobel(image: &PixelBuffer) -> PixelBuffer {
    debug_assert!(is_grayscale(image), "sobel expects grayscale input");

    let (w, h) = image.dimensions();
    let mut out = PixelBuffer::new(w, h);
    if w < 3 || h < 3 {
        return out;
    }

    let luma = GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y).0[0]]));
    // Interior values match the plain kernels; imageproc's clamped
    // border results are discarded below.
    let gx = horizontal_sobel(&luma);
    let gy = vertical_sobel(&luma);

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let m = magnitude(gx.get_pixel(x, y).0[0], gy.get_pixel(x, y).0[0]);
            out.put_pixel(x, y, Rgba([m, m, m, 255]));
        }
    }

    out
}

/// Gradient magnitude clamped to 255 and rounded to the nearest level.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn magnitude(gx: i16, gy: i16) -> u8 {
    let gx = f64::from(gx);
    let gy = f64::from(gy);
    // Always in 0.0..=255.0 after the min.
    gx.hypot(gy).min(255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(w: u32, h: u32, f: impl Fn(u32, u32) -> u8) -> PixelBuffer {
        PixelBuffer::from_fn(w, h, |x, y| {
            let v = f(x, y);
            Rgba([v, v, v, 255])
        })
    }

    #[test]
    fn uniform_buffer_has_zero_interior_gradient() {
        let out = sobel(&gray(6, 6, |_, _| 200));
        for y in 1..5 {
            for x in 1..5 {
                assert_eq!(out.get_pixel(x, y).0, [0, 0, 0, 255]);
            }
        }
    }

    #[test]
    fn border_is_left_unset() {
        let out = sobel(&gray(5, 5, |_, _| 90));
        for y in 0..5 {
            for x in 0..5 {
                let on_border = x == 0 || y == 0 || x == 4 || y == 4;
                if on_border {
                    assert_eq!(out.get_pixel(x, y).0, [0, 0, 0, 0], "({x},{y})");
                } else {
                    assert_eq!(out.get_pixel(x, y).0[3], 255, "({x},{y})");
                }
            }
        }
    }

    #[test]
    fn border_unset_even_next_to_strong_edge() {
        let out = sobel(&gray(6, 6, |x, _| if x < 3 { 0 } else { 255 }));
        assert_eq!(out.get_pixel(0, 3).0, [0, 0, 0, 0]);
        assert_eq!(out.get_pixel(3, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn vertical_step_saturates() {
        // Gx = 4 * 255 at the step, clamped to 255.
        let out = sobel(&gray(6, 5, |x, _| if x < 3 { 0 } else { 255 }));
        assert_eq!(out.get_pixel(2, 2).0[0], 255);
        assert_eq!(out.get_pixel(3, 2).0[0], 255);
        assert_eq!(out.get_pixel(1, 2).0[0], 0);
        assert_eq!(out.get_pixel(4, 2).0[0], 0);
    }

    #[test]
    fn gentle_ramp_gives_exact_magnitude() {
        // Horizontal ramp of slope 5: Gx = (1 + 2 + 1) * 2 * 5 = 40, Gy = 0.
        let out = sobel(&gray(5, 5, |x, _| u8::try_from(x * 5).unwrap_or(0)));
        assert_eq!(out.get_pixel(2, 2).0, [40, 40, 40, 255]);
    }

    #[test]
    fn diagonal_magnitude_is_rounded() {
        // Ramp along both axes with slope 1: Gx = Gy = 8, |G| = 11.31.
        let out = sobel(&gray(5, 5, |x, y| u8::try_from(x + y).unwrap_or(0)));
        assert_eq!(out.get_pixel(2, 2).0[0], 11);
    }

    #[test]
    fn tiny_buffers_have_no_interior() {
        for (w, h) in [(1, 1), (2, 5), (5, 2)] {
            let out = sobel(&gray(w, h, |x, _| if x == 0 { 0 } else { 255 }));
            assert_eq!(out.dimensions(), (w, h));
            assert!(out.pixels().all(|p| p.0 == [0, 0, 0, 0]));
        }
    }

    #[test]
    fn zero_area_is_noop() {
        assert_eq!(sobel(&PixelBuffer::new(0, 0)).dimensions(), (0, 0));
    }
}
