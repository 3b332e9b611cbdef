//! barscan-pipeline: Camera-frame preprocessing for barcode scanning (sans-IO).
//!
//! Prepares captured RGBA frames for a barcode decoder through:
//! grayscale -> optional median blur -> optional Sobel edge enhancement ->
//! optional adaptive or global binarization.
//!
//! An optional enhancement pre-pass (CLAHE, then unsharp masking) can be
//! applied to the raw frame before the pipeline proper; see [`enhance`].
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! pixel buffers and returns new ones. Inputs are never modified. File
//! loading, decoding and the browser worker live in `barscan-bench` and
//! `barscan-worker`.

pub mod clahe;
pub mod diagnostics;
pub mod edge;
pub mod grayscale;
pub mod median;
pub mod roi;
pub mod threshold;
pub mod types;
pub mod unsharp;

mod window;

pub use diagnostics::{Clock, PipelineDiagnostics, process_staged_with_diagnostics};
pub use roi::RegionOfInterest;
pub use types::{
    Dimensions, PipelineError, PixelBuffer, RgbaImage, StageConfig, StagedResult,
    pixel_buffer_from_raw,
};

use diagnostics::{BinarizeMode, NullClock, binarize_mode};

/// Run the preprocessing pipeline on a single frame.
///
/// # Pipeline steps
///
/// 1. Grayscale conversion (always)
/// 2. Median blur (`config.median`)
/// 3. Sobel edge enhancement (`config.sobel`)
/// 4. Adaptive threshold (`config.adaptive`), otherwise a global cut
///    when `config.threshold` is set
///
/// The enhancement pre-pass is never applied here; call [`enhance`]
/// first when it is wanted. The output always has the source
/// dimensions.
#[must_use = "returns the processed buffer"]
#[tracing::instrument(skip_all, fields(width = source.width(), height = source.height()))]
pub fn run(source: &PixelBuffer, config: &StageConfig) -> PixelBuffer {
    let mut current = grayscale::grayscale(source);

    if config.median {
        current = median::median_blur(&current, config.median_radius);
    }

    if config.sobel {
        current = edge::sobel(&current);
    }

    match binarize_mode(config) {
        Some(BinarizeMode::Adaptive { window_size, c }) => {
            current = threshold::adaptive_threshold(&current, window_size, c);
        }
        Some(BinarizeMode::Global { threshold }) => {
            current = threshold::global_threshold(&current, threshold);
        }
        None => {}
    }

    tracing::debug!(
        median = config.median,
        sobel = config.sobel,
        adaptive = config.adaptive,
        threshold = ?config.threshold,
        "pipeline run complete"
    );
    current
}

/// Apply the enhancement pre-pass: CLAHE, then unsharp masking, each
/// only when enabled.
///
/// With neither enabled the source is returned as a copy.
#[must_use = "returns the enhanced buffer"]
#[tracing::instrument(skip_all, fields(width = source.width(), height = source.height()))]
pub fn enhance(source: &PixelBuffer, config: &StageConfig) -> PixelBuffer {
    let mut current = source.clone();

    if config.clahe {
        current = clahe::clahe(&current, config.clahe_tile_size, config.clahe_clip_limit);
        tracing::debug!(
            tile_size = config.clahe_tile_size,
            clip_limit = config.clahe_clip_limit,
            "clahe applied"
        );
    }

    if config.unsharp {
        current = unsharp::unsharp_mask(&current, config.unsharp_radius, config.unsharp_amount);
        tracing::debug!(
            radius = config.unsharp_radius,
            amount = config.unsharp_amount,
            "unsharp mask applied"
        );
    }

    current
}

/// Run the pre-pass and the pipeline, keeping every intermediate buffer.
///
/// Use [`process_staged_with_diagnostics`] for per-stage timings.
#[must_use = "returns the staged result"]
pub fn process_staged(source: &PixelBuffer, config: &StageConfig) -> StagedResult {
    process_staged_with_diagnostics(source, config, &NullClock).0
}

/// Run the pre-pass and the pipeline, returning only the final buffer.
///
/// Equivalent to `run(&enhance(source, config), config)`.
#[must_use = "returns the processed buffer"]
pub fn process(source: &PixelBuffer, config: &StageConfig) -> PixelBuffer {
    if config.wants_enhancement() {
        run(&enhance(source, config), config)
    } else {
        run(source, config)
    }
}
