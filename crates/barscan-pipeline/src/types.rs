//! Shared types for the barscan preprocessing pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` so downstream crates can reference pixel
/// buffers without depending on `image` directly.
pub use image::RgbaImage;

/// A fixed-size grid of 8-bit RGBA samples.
///
/// Every stage reads and writes this type. The `image` crate already
/// guarantees `len == width * height * 4` for any constructed buffer;
/// raw byte slices from outside go through [`pixel_buffer_from_raw`].
pub type PixelBuffer = RgbaImage;

/// Build a [`PixelBuffer`] from raw RGBA bytes.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidDimension`] if `bytes.len()` is not
/// exactly `width * height * 4`.
pub fn pixel_buffer_from_raw(
    width: u32,
    height: u32,
    bytes: Vec<u8>,
) -> Result<PixelBuffer, PipelineError> {
    let expected = u64::from(width) * u64::from(height) * 4;
    let len = bytes.len();
    if u64::try_from(len).ok() != Some(expected) {
        return Err(PipelineError::InvalidDimension { width, height, len });
    }
    RgbaImage::from_raw(width, height, bytes)
        .ok_or(PipelineError::InvalidDimension { width, height, len })
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an existing buffer.
    #[must_use]
    pub fn of(buffer: &PixelBuffer) -> Self {
        Self {
            width: buffer.width(),
            height: buffer.height(),
        }
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Stage selection and parameters for one preprocessing run.
///
/// Constructed by the caller per invocation and never mutated while a
/// run is in progress. `clahe` and `unsharp` select the enhancement
/// pre-pass ([`crate::enhance`]); the remaining flags drive
/// [`crate::run`].
///
/// Missing fields deserialize to their defaults, so a caller can send
/// `{"median": true}` and get the documented parameters for the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Apply the median denoiser after grayscale conversion.
    pub median: bool,

    /// Median neighborhood radius; the window is `(2r+1)²` pixels.
    pub median_radius: u32,

    /// Apply Sobel edge enhancement.
    pub sobel: bool,

    /// Apply local-mean adaptive binarization.
    pub adaptive: bool,

    /// Adaptive threshold window size in pixels. Expected to be odd;
    /// the half-width is `window_size / 2`.
    pub window_size: u32,

    /// Constant subtracted from the local mean before comparison.
    pub c: f64,

    /// Global cut used when `adaptive` is off. `None` skips binarization.
    pub threshold: Option<f64>,

    /// Apply tile-wise contrast-limited histogram equalization in the
    /// pre-pass.
    pub clahe: bool,

    /// Nominal CLAHE tile edge length in pixels.
    pub clahe_tile_size: u32,

    /// Maximum histogram bucket count per CLAHE tile.
    pub clahe_clip_limit: u32,

    /// Apply unsharp masking in the pre-pass (after CLAHE).
    pub unsharp: bool,

    /// Box blur radius used by the unsharp mask.
    pub unsharp_radius: u32,

    /// Gain applied to the high-frequency residual.
    pub unsharp_amount: f64,
}

impl StageConfig {
    /// Default median radius (3×3 window).
    pub const DEFAULT_MEDIAN_RADIUS: u32 = 1;
    /// Default adaptive threshold window size.
    pub const DEFAULT_WINDOW_SIZE: u32 = 15;
    /// Default adaptive threshold constant.
    pub const DEFAULT_C: f64 = 7.0;
    /// Default CLAHE tile size.
    pub const DEFAULT_CLAHE_TILE_SIZE: u32 = 8;
    /// Default CLAHE clip limit.
    pub const DEFAULT_CLAHE_CLIP_LIMIT: u32 = 40;
    /// Default unsharp mask radius.
    pub const DEFAULT_UNSHARP_RADIUS: u32 = 1;
    /// Default unsharp mask amount.
    pub const DEFAULT_UNSHARP_AMOUNT: f64 = 1.0;
    /// Largest accepted median or unsharp radius (a 129×129 window).
    pub const MAX_RADIUS: u32 = 64;

    /// Check field ranges that the stage functions cannot represent.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.window_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "window_size must be at least 1".to_string(),
            ));
        }
        if self.clahe_tile_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "clahe_tile_size must be at least 1".to_string(),
            ));
        }
        if self.clahe_clip_limit == 0 {
            return Err(PipelineError::InvalidConfig(
                "clahe_clip_limit must be at least 1".to_string(),
            ));
        }
        if self.median_radius > Self::MAX_RADIUS {
            return Err(PipelineError::InvalidConfig(format!(
                "median_radius must be at most {}, got {}",
                Self::MAX_RADIUS,
                self.median_radius
            )));
        }
        if self.unsharp_radius > Self::MAX_RADIUS {
            return Err(PipelineError::InvalidConfig(format!(
                "unsharp_radius must be at most {}, got {}",
                Self::MAX_RADIUS,
                self.unsharp_radius
            )));
        }
        if !self.c.is_finite() {
            return Err(PipelineError::InvalidConfig(format!(
                "c must be finite, got {}",
                self.c
            )));
        }
        if let Some(t) = self.threshold
            && !t.is_finite()
        {
            return Err(PipelineError::InvalidConfig(format!(
                "threshold must be finite, got {t}"
            )));
        }
        if !self.unsharp_amount.is_finite() {
            return Err(PipelineError::InvalidConfig(format!(
                "unsharp_amount must be finite, got {}",
                self.unsharp_amount
            )));
        }
        Ok(())
    }

    /// Whether any enhancement pre-pass stage is enabled.
    #[must_use]
    pub const fn wants_enhancement(&self) -> bool {
        self.clahe || self.unsharp
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            median: false,
            median_radius: Self::DEFAULT_MEDIAN_RADIUS,
            sobel: false,
            adaptive: false,
            window_size: Self::DEFAULT_WINDOW_SIZE,
            c: Self::DEFAULT_C,
            threshold: None,
            clahe: false,
            clahe_tile_size: Self::DEFAULT_CLAHE_TILE_SIZE,
            clahe_clip_limit: Self::DEFAULT_CLAHE_CLIP_LIMIT,
            unsharp: false,
            unsharp_radius: Self::DEFAULT_UNSHARP_RADIUS,
            unsharp_amount: Self::DEFAULT_UNSHARP_AMOUNT,
        }
    }
}

/// Result of a staged run with every intermediate buffer preserved.
///
/// Optional fields are `Some` only when the corresponding stage was
/// enabled. The debug views of the scanner (gray / median / sobel /
/// binarized) read straight from these.
#[derive(Debug, Clone)]
pub struct StagedResult {
    /// Caller-supplied source buffer, untouched.
    pub original: PixelBuffer,
    /// Output of the CLAHE/unsharp pre-pass.
    pub enhanced: Option<PixelBuffer>,
    /// Grayscale conversion (always present).
    pub grayscale: PixelBuffer,
    /// Median-denoised buffer.
    pub median: Option<PixelBuffer>,
    /// Sobel gradient magnitude.
    pub sobel: Option<PixelBuffer>,
    /// Adaptive or global binarization.
    pub binarized: Option<PixelBuffer>,
    /// Source dimensions; every stage preserves them.
    pub dimensions: Dimensions,
}

impl StagedResult {
    /// The last buffer the pipeline produced.
    #[must_use]
    pub fn final_image(&self) -> &PixelBuffer {
        self.binarized
            .as_ref()
            .or(self.sobel.as_ref())
            .or(self.median.as_ref())
            .unwrap_or(&self.grayscale)
    }

}

/// Errors that can occur while preparing pipeline input.
///
/// Stage functions themselves never fail; these cover buffer
/// construction, image decoding, and configuration checks.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Raw RGBA byte length does not match the stated dimensions.
    #[error("buffer of {len} bytes does not match {width}x{height} RGBA")]
    InvalidDimension {
        /// Stated width.
        width: u32,
        /// Stated height.
        height: u32,
        /// Actual byte length.
        len: usize,
    },

    /// The encoded image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the encoded input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Stage configuration is invalid.
    #[error("invalid stage configuration: {0}")]
    InvalidConfig(String),
}

/// Serde-compatible proxy for `PipelineError`.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    InvalidDimension { width: u32, height: u32, len: usize },
    EmptyInput,
    ImageDecode(String),
    InvalidConfig(String),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::InvalidDimension { width, height, len } => PipelineErrorProxy::InvalidDimension {
                width: *width,
                height: *height,
                len: *len,
            },
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            PipelineErrorProxy::InvalidDimension { width, height, len } => {
                Self::InvalidDimension { width, height, len }
            }
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            // The typed image error cannot be rebuilt; keep its message.
            PipelineErrorProxy::ImageDecode(msg) => {
                Self::InvalidConfig(format!("image decode error: {msg}"))
            }
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_accepts_matching_length() {
        let buf = pixel_buffer_from_raw(3, 2, vec![7; 24]).unwrap();
        assert_eq!(buf.dimensions(), (3, 2));
    }

    #[test]
    fn from_raw_rejects_short_buffer() {
        let result = pixel_buffer_from_raw(3, 2, vec![0; 23]);
        assert!(matches!(
            result,
            Err(PipelineError::InvalidDimension {
                width: 3,
                height: 2,
                len: 23
            })
        ));
    }

    #[test]
    fn from_raw_rejects_long_buffer() {
        let result = pixel_buffer_from_raw(1, 1, vec![0; 8]);
        assert!(matches!(
            result,
            Err(PipelineError::InvalidDimension { len: 8, .. })
        ));
    }

    #[test]
    fn from_raw_accepts_zero_area() {
        let buf = pixel_buffer_from_raw(0, 5, Vec::new()).unwrap();
        assert_eq!(buf.dimensions(), (0, 5));
    }

    #[test]
    fn dimensions_helpers() {
        let d = Dimensions::of(&RgbaImage::new(4, 3));
        assert_eq!(d.pixel_count(), 12);
        assert!(!d.is_empty());
        assert!(
            Dimensions {
                width: 0,
                height: 3
            }
            .is_empty()
        );
    }

    #[test]
    fn stage_config_defaults() {
        let config = StageConfig::default();
        assert!(!config.median);
        assert_eq!(config.median_radius, 1);
        assert!(!config.sobel);
        assert!(!config.adaptive);
        assert_eq!(config.window_size, 15);
        assert!((config.c - 7.0).abs() < f64::EPSILON);
        assert!(config.threshold.is_none());
        assert!(!config.clahe);
        assert_eq!(config.clahe_tile_size, 8);
        assert_eq!(config.clahe_clip_limit, 40);
        assert!(!config.unsharp);
        assert_eq!(config.unsharp_radius, 1);
        assert!((config.unsharp_amount - 1.0).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_tile_size() {
        let config = StageConfig {
            clahe_tile_size: 0,
            ..StageConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(ref s)) if s.contains("clahe_tile_size")
        ));
    }

    #[test]
    fn validate_rejects_zero_window() {
        let config = StageConfig {
            window_size: 0,
            ..StageConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_huge_radius() {
        let config = StageConfig {
            median_radius: 40_000,
            ..StageConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(ref s)) if s.contains("median_radius")
        ));

        let config = StageConfig {
            unsharp_radius: u32::MAX,
            ..StageConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(ref s)) if s.contains("unsharp_radius")
        ));

        let config = StageConfig {
            median_radius: StageConfig::MAX_RADIUS,
            unsharp_radius: StageConfig::MAX_RADIUS,
            ..StageConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_nan_threshold() {
        let config = StageConfig {
            threshold: Some(f64::NAN),
            ..StageConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: StageConfig = serde_json::from_str(r#"{"median": true, "c": 3}"#).unwrap();
        assert!(config.median);
        assert!((config.c - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.window_size, StageConfig::DEFAULT_WINDOW_SIZE);
    }

    #[test]
    fn stage_config_serde_round_trip() {
        let config = StageConfig {
            median: true,
            median_radius: 2,
            adaptive: true,
            threshold: Some(128.0),
            clahe: true,
            unsharp_amount: 1.5,
            ..StageConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: StageConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn final_image_prefers_latest_stage() {
        let gray = RgbaImage::from_pixel(1, 1, image::Rgba([1, 1, 1, 255]));
        let sobel = RgbaImage::from_pixel(1, 1, image::Rgba([2, 2, 2, 255]));
        let staged = StagedResult {
            original: gray.clone(),
            enhanced: None,
            grayscale: gray,
            median: None,
            sobel: Some(sobel.clone()),
            binarized: None,
            dimensions: Dimensions {
                width: 1,
                height: 1,
            },
        };
        assert_eq!(staged.final_image(), &sobel);
    }

    #[test]
    fn error_display() {
        let err = PipelineError::InvalidDimension {
            width: 2,
            height: 2,
            len: 3,
        };
        assert_eq!(err.to_string(), "buffer of 3 bytes does not match 2x2 RGBA");
        assert_eq!(
            PipelineError::EmptyInput.to_string(),
            "input image data is empty"
        );
    }

    #[test]
    fn pipeline_error_serde_round_trip() {
        let err = PipelineError::InvalidDimension {
            width: 4,
            height: 5,
            len: 6,
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            back,
            PipelineError::InvalidDimension {
                width: 4,
                height: 5,
                len: 6
            }
        ));

        let err = PipelineError::InvalidConfig("bad".to_string());
        let json = serde_json::to_string(&err).unwrap();
        let back: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, PipelineError::InvalidConfig(ref s) if s == "bad"));
    }
}
