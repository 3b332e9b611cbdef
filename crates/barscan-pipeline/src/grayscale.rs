//! Image decoding and grayscale conversion.
//!
//! [`grayscale`] is the first stage of every pipeline run: it replaces
//! R, G and B with their unweighted average so later stages can read
//! the R channel alone. [`decode`] is a convenience for callers that
//! start from encoded image bytes rather than a captured frame.

use crate::types::{PipelineError, PixelBuffer};

/// Decode encoded image bytes (PNG, JPEG, BMP, WebP) into RGBA.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgba8())
}

/// Convert to grayscale using the plain channel mean `(R+G+B)/3`.
///
/// This is deliberately not perceptual luma. The mean is rounded to
/// the nearest integer; since the remainder of a division by three is
/// never exactly one half, no tie-breaking rule is involved. Alpha is
/// copied through.
#[must_use = "returns the grayscale buffer"]
pub fn grayscale(image: &PixelBuffer) -> PixelBuffer {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let v = channel_mean(r, g, b);
        pixel.0 = [v, v, v, a];
    }
    out
}

/// Rounded mean of three channels.
#[allow(clippy::cast_possible_truncation)]
const fn channel_mean(r: u8, g: u8, b: u8) -> u8 {
    // (sum + 1) / 3 rounds k + 1/3 down and k + 2/3 up. Max is 255.
    ((r as u16 + g as u16 + b as u16 + 1) / 3) as u8
}

/// Whether every pixel satisfies R = G = B.
///
/// Median, Sobel and adaptive threshold read only the R channel and
/// assert this precondition in debug builds.
#[must_use]
pub fn is_grayscale(image: &PixelBuffer) -> bool {
    image.pixels().all(|p| p.0[0] == p.0[1] && p.0[1] == p.0[2])
}
