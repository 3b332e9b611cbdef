//! Region-of-interest cropping.
//!
//! Scanning a centered horizontal band instead of the whole frame cuts
//! the per-frame cost of every later stage (the median blur in
//! particular) and keeps background clutter away from the decoder.
//! Cropping is always the caller's choice; [`crate::run`] never crops.

use serde::{Deserialize, Serialize};

use crate::types::PixelBuffer;

/// A crop rectangle given as fractions of the frame size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    /// Left edge as a fraction of frame width.
    pub x: f64,
    /// Top edge as a fraction of frame height.
    pub y: f64,
    /// Width as a fraction of frame width.
    pub width: f64,
    /// Height as a fraction of frame height.
    pub height: f64,
}

impl RegionOfInterest {
    /// The whole frame.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }

    /// Resolve to a pixel rectangle `(x, y, width, height)` inside a
    /// `frame_width`×`frame_height` frame.
    ///
    /// Offsets and sizes are floored, then clamped so the rectangle
    /// never leaves the frame. Non-finite or negative fractions resolve
    /// to zero.
    #[must_use]
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> (u32, u32, u32, u32) {
        let x = scale(self.x, frame_width);
        let y = scale(self.y, frame_height);
        let width = scale(self.width, frame_width).min(frame_width - x);
        let height = scale(self.height, frame_height).min(frame_height - y);
        (x, y, width, height)
    }
}

impl Default for RegionOfInterest {
    /// Centered band: 70% of the width, 30% of the height, starting 15%
    /// in from the left and 35% down from the top.
    fn default() -> Self {
        Self {
            x: 0.15,
            y: 0.35,
            width: 0.7,
            height: 0.3,
        }
    }
}

/// `floor(fraction * len)` clamped to `0..=len`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale(fraction: f64, len: u32) -> u32 {
    let v = (fraction * f64::from(len)).floor();
    if v.is_nan() || v <= 0.0 {
        0
    } else {
        v.min(f64::from(len)) as u32
    }
}

/// Copy the region out of `image` into a new buffer.
///
/// A region that resolves to zero width or height yields a zero-area
/// buffer, which every stage accepts as a no-op.
#[must_use = "returns the cropped buffer"]
pub fn crop(image: &PixelBuffer, roi: &RegionOfInterest) -> PixelBuffer {
    let (x, y, width, height) = roi.to_pixels(image.width(), image.height());
    image::imageops::crop_imm(image, x, y, width, height).to_image()
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    #[test]
    fn default_band_on_640x480() {
        let roi = RegionOfInterest::default();
        assert_eq!(roi.to_pixels(640, 480), (96, 168, 448, 144));
    }

    #[test]
    fn full_frame_is_identity() {
        let img = PixelBuffer::from_fn(7, 5, |x, y| {
            Rgba([
                u8::try_from(x).unwrap_or(0),
                u8::try_from(y).unwrap_or(0),
                0,
                255,
            ])
        });
        assert_eq!(crop(&img, &RegionOfInterest::full()), img);
    }

    #[test]
    fn crop_copies_expected_pixels() {
        let img = PixelBuffer::from_fn(10, 10, |x, y| {
            Rgba([
                u8::try_from(x).unwrap_or(0),
                u8::try_from(y).unwrap_or(0),
                0,
                255,
            ])
        });
        let roi = RegionOfInterest {
            x: 0.2,
            y: 0.5,
            width: 0.3,
            height: 0.2,
        };
        let out = crop(&img, &roi);
        assert_eq!(out.dimensions(), (3, 2));
        assert_eq!(out.get_pixel(0, 0).0, [2, 5, 0, 255]);
        assert_eq!(out.get_pixel(2, 1).0, [4, 6, 0, 255]);
    }

    #[test]
    fn overflowing_region_is_clamped() {
        let roi = RegionOfInterest {
            x: 0.8,
            y: 0.9,
            width: 0.5,
            height: 2.0,
        };
        assert_eq!(roi.to_pixels(100, 100), (80, 90, 20, 10));
    }

    #[test]
    fn degenerate_region_is_empty() {
        let roi = RegionOfInterest {
            x: 0.5,
            y: 0.5,
            width: -1.0,
            height: f64::NAN,
        };
        let out = crop(&PixelBuffer::new(20, 20), &roi);
        assert_eq!(out.dimensions(), (0, 0));
    }

    #[test]
    fn tiny_frame_default_band() {
        // 3x3: x = floor(0.45) = 0, y = floor(1.05) = 1, w = floor(2.1) = 2,
        // h = floor(0.9) = 0.
        assert_eq!(RegionOfInterest::default().to_pixels(3, 3), (0, 1, 2, 0));
    }
}
