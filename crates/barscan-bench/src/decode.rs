//! Symbol decoding behind a small trait.
//!
//! The preprocessing pipeline only prepares frames; reading the symbol
//! is left to an external library. [`QrDecoder`] wraps `rqrr`, and the
//! bench uses [`decode_hybrid`] to try the raw frame before the
//! processed one.

use barscan_pipeline::PixelBuffer;
use serde::Serialize;

/// Symbology of a decoded symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BarcodeFormat {
    /// QR Code (ISO/IEC 18004).
    QrCode,
}

/// A successfully decoded symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decoded {
    /// Decoded payload text.
    pub text: String,
    /// Symbology the payload was read from.
    pub format: BarcodeFormat,
}

/// Which buffer a hybrid decode succeeded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecodeSource {
    /// The unprocessed frame.
    Raw,
    /// The pipeline output.
    Processed,
}

/// Reads a symbol out of a pixel buffer.
pub trait Decoder {
    /// Decode the first symbol found, or `None`.
    fn decode(&self, buffer: &PixelBuffer) -> Option<Decoded>;
}

/// QR decoder backed by `rqrr`.
///
/// Luminance is taken from the R channel, which is exact for pipeline
/// output and a cheap proxy for raw color frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrDecoder;

impl Decoder for QrDecoder {
    fn decode(&self, buffer: &PixelBuffer) -> Option<Decoded> {
        let (w, h) = buffer.dimensions();
        if w == 0 || h == 0 {
            return None;
        }
        let width = usize::try_from(w).ok()?;
        let height = usize::try_from(h).ok()?;
        let raw = buffer.as_raw();

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| {
            raw[(y * width + x) * 4]
        });
        let grids = prepared.detect_grids();
        tracing::debug!(grids = grids.len(), "qr grids detected");

        grids.iter().find_map(|grid| match grid.decode() {
            Ok((_, text)) => Some(Decoded {
                text,
                format: BarcodeFormat::QrCode,
            }),
            Err(e) => {
                tracing::debug!(error = %e, "qr grid failed to decode");
                None
            }
        })
    }
}

/// Try the raw frame first and fall back to the processed buffer.
pub fn decode_hybrid<D: Decoder>(
    decoder: &D,
    raw: &PixelBuffer,
    processed: &PixelBuffer,
) -> Option<(Decoded, DecodeSource)> {
    decoder
        .decode(raw)
        .map(|d| (d, DecodeSource::Raw))
        .or_else(|| {
            decoder
                .decode(processed)
                .map(|d| (d, DecodeSource::Processed))
        })
}
