//! Median blur: rank-order denoising over a square neighborhood.
//!
//! A mean blur would smear bar edges; the median removes impulse noise
//! (sensor speckle, dust) while keeping step edges sharp.

use image::Rgba;

use crate::grayscale::is_grayscale;
use crate::types::{PixelBuffer, StageConfig};
use crate::window::{clamp_to_edge, offsets};

/// Replace each pixel with the median R value of its `(2r+1)²`
/// neighborhood.
///
/// Input must already be grayscale; only R is read. Edges are handled
/// by clamping coordinates. The selected sample is the one at index
/// `count / 2` of the sorted window, which is the exact median because
/// the window count is always odd. Output has R = G = B = median and
/// alpha 255.
///
/// Cost is `O(W·H·k)` for a window of `k` samples, using a linear
/// selection instead of a full sort.
#[must_use = "returns the denoised buffer"]
pub fn median_blur(image: &PixelBuffer, radius: u32) -> PixelBuffer {
    debug_assert!(is_grayscale(image), "median_blur expects grayscale input");

    let (w, h) = image.dimensions();
    let mut out = PixelBuffer::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    let mut window: Vec<u8> = Vec::with_capacity(window_capacity(radius));

    for y in 0..h {
        for x in 0..w {
            window.clear();
            for dy in offsets(radius) {
                let ny = clamp_to_edge(y, dy, h);
                for dx in offsets(radius) {
                    let nx = clamp_to_edge(x, dx, w);
                    window.push(image.get_pixel(nx, ny).0[0]);
                }
            }
            let mid = window.len() / 2;
            let (_, &mut m, _) = window.select_nth_unstable(mid);
            out.put_pixel(x, y, Rgba([m, m, m, 255]));
        }
    }

    out
}

/// Preallocation for a `(2r+1)²` window, capped at the largest radius
/// `StageConfig::validate` accepts. Larger windows grow on demand.
fn window_capacity(radius: u32) -> usize {
    let side = 2 * usize::try_from(radius.min(StageConfig::MAX_RADIUS)).unwrap_or(0) + 1;
    side * side
}
