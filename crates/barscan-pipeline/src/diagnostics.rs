//! Pipeline diagnostics: timing and pixel counts for each stage.
//!
//! Every call to [`process_staged_with_diagnostics`] collects these
//! alongside the staged buffers. They exist for parameter tuning: how
//! much a given median radius costs on a given frame size, how many
//! pixels a binarization setting turns black, and so on.
//!
//! Time is read through the [`Clock`] trait so this crate stays free of
//! platform time sources. The bench passes a `std::time::Instant` clock.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, PixelBuffer, StageConfig, StagedResult};

/// Source of monotonic timestamps.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// Current timestamp.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// A clock that never advances. Used when only the buffers matter.
pub(crate) struct NullClock;

impl Clock for NullClock {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, (): &()) -> Duration {
        Duration::ZERO
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single staged run.
///
/// Stages that are conditionally skipped have `Option` fields that are
/// `None` when the stage was not executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Pre-pass: CLAHE (only when `config.clahe`).
    pub clahe: Option<StageDiagnostics>,
    /// Pre-pass: unsharp mask (only when `config.unsharp`).
    pub unsharp: Option<StageDiagnostics>,
    /// Grayscale conversion.
    pub grayscale: StageDiagnostics,
    /// Median blur (only when `config.median`).
    pub median: Option<StageDiagnostics>,
    /// Sobel edge enhancement (only when `config.sobel`).
    pub sobel: Option<StageDiagnostics>,
    /// Adaptive or global binarization.
    pub binarize: Option<StageDiagnostics>,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// CLAHE metrics.
    Clahe {
        /// Tile grid columns.
        tiles_x: u32,
        /// Tile grid rows.
        tiles_y: u32,
        /// Histogram clip limit.
        clip_limit: u32,
    },
    /// Unsharp mask metrics.
    Unsharp {
        /// Box blur radius.
        radius: u32,
        /// Residual gain.
        amount: f64,
    },
    /// Grayscale conversion metrics.
    Grayscale {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },
    /// Median blur metrics.
    Median {
        /// Neighborhood radius.
        radius: u32,
        /// Samples per window, `(2r+1)²`.
        window_samples: u64,
    },
    /// Sobel metrics.
    Sobel {
        /// Interior pixels with non-zero gradient magnitude.
        edge_pixel_count: u64,
        /// Total pixel count for computing edge density.
        total_pixel_count: u64,
    },
    /// Binarization metrics.
    Binarize {
        /// Which binarization ran and with what parameters.
        mode: BinarizeMode,
        /// Pixels set to black.
        dark_pixel_count: u64,
        /// Total pixel count for computing dark density.
        total_pixel_count: u64,
    },
}

/// Binarization variant recorded in [`StageMetrics::Binarize`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BinarizeMode {
    /// Local-mean threshold.
    Adaptive {
        /// Window size in pixels.
        window_size: u32,
        /// Constant subtracted from the mean.
        c: f64,
    },
    /// Single global cut.
    Global {
        /// The cut level.
        threshold: f64,
    },
}

/// High-level summary for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source width in pixels.
    pub image_width: u32,
    /// Source height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Number of stages that ran, pre-pass included.
    pub stage_count: usize,
}

impl PipelineDiagnostics {
    /// Stages that ran, in execution order.
    #[must_use]
    pub fn stages(&self) -> Vec<(&'static str, &StageDiagnostics)> {
        let mut s = Vec::with_capacity(6);
        if let Some(ref d) = self.clahe {
            s.push(("CLAHE", d));
        }
        if let Some(ref d) = self.unsharp {
            s.push(("Unsharp", d));
        }
        s.push(("Grayscale", &self.grayscale));
        if let Some(ref d) = self.median {
            s.push(("Median", d));
        }
        if let Some(ref d) = self.sobel {
            s.push(("Sobel", d));
        }
        if let Some(ref d) = self.binarize {
            s.push(("Binarize", d));
        }
        s
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Preprocessing Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(72));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Percentage of `part` in `whole`, zero for an empty whole.
#[allow(clippy::cast_precision_loss)]
fn density(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64 * 100.0
    } else {
        0.0
    }
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Clahe {
            tiles_x,
            tiles_y,
            clip_limit,
        } => format!("{tiles_x}x{tiles_y} tiles, clip={clip_limit}"),
        StageMetrics::Unsharp { radius, amount } => format!("r={radius} amount={amount:.2}"),
        StageMetrics::Grayscale { width, height } => format!("{width}x{height}"),
        StageMetrics::Median {
            radius,
            window_samples,
        } => format!("r={radius} ({window_samples} samples/px)"),
        StageMetrics::Sobel {
            edge_pixel_count,
            total_pixel_count,
        } => format!(
            "edges={edge_pixel_count} ({:.1}%)",
            density(*edge_pixel_count, *total_pixel_count),
        ),
        StageMetrics::Binarize {
            mode,
            dark_pixel_count,
            total_pixel_count,
        } => {
            let mode = match mode {
                BinarizeMode::Adaptive { window_size, c } => {
                    format!("adaptive window={window_size} c={c:.1}")
                }
                BinarizeMode::Global { threshold } => format!("global t={threshold:.1}"),
            };
            format!(
                "{mode} dark={dark_pixel_count} ({:.1}%)",
                density(*dark_pixel_count, *total_pixel_count),
            )
        }
    }
}

/// Count pixels whose R value is non-zero.
pub(crate) fn count_nonzero(image: &PixelBuffer) -> u64 {
    image.pixels().map(|p| u64::from(p.0[0] != 0)).sum()
}

/// Count pixels whose R value is zero.
pub(crate) fn count_dark(image: &PixelBuffer) -> u64 {
    image.pixels().map(|p| u64::from(p.0[0] == 0)).sum()
}

/// Time `f` with `clock`, returning its output and the elapsed time.
fn timed<C: Clock, T>(clock: &C, f: impl FnOnce() -> T) -> (T, Duration) {
    let start = clock.now();
    let out = f();
    (out, clock.elapsed(&start))
}

/// Run the enhancement pre-pass and the pipeline, keeping every
/// intermediate buffer and per-stage diagnostics.
///
/// Stage order and outputs are identical to
/// `run(&enhance(source, config), config)`.
#[tracing::instrument(skip_all, fields(width = source.width(), height = source.height()))]
pub fn process_staged_with_diagnostics<C: Clock>(
    source: &PixelBuffer,
    config: &StageConfig,
    clock: &C,
) -> (StagedResult, PipelineDiagnostics) {
    let total_start = clock.now();
    let dimensions = Dimensions::of(source);
    let pixel_count = dimensions.pixel_count();

    // Pre-pass.
    let mut enhanced: Option<PixelBuffer> = None;
    let clahe = config.clahe.then(|| {
        let (out, duration) = timed(clock, || {
            crate::clahe::clahe(source, config.clahe_tile_size, config.clahe_clip_limit)
        });
        let tile = config.clahe_tile_size.max(1);
        let metrics = StageMetrics::Clahe {
            tiles_x: (dimensions.width / tile).max(1),
            tiles_y: (dimensions.height / tile).max(1),
            clip_limit: config.clahe_clip_limit,
        };
        enhanced = Some(out);
        StageDiagnostics { duration, metrics }
    });
    let unsharp = config.unsharp.then(|| {
        let input = enhanced.as_ref().unwrap_or(source);
        let (out, duration) = timed(clock, || {
            crate::unsharp::unsharp_mask(input, config.unsharp_radius, config.unsharp_amount)
        });
        enhanced = Some(out);
        StageDiagnostics {
            duration,
            metrics: StageMetrics::Unsharp {
                radius: config.unsharp_radius,
                amount: config.unsharp_amount,
            },
        }
    });

    // Pipeline proper.
    let (gray, duration) = timed(clock, || {
        crate::grayscale::grayscale(enhanced.as_ref().unwrap_or(source))
    });
    let grayscale = StageDiagnostics {
        duration,
        metrics: StageMetrics::Grayscale {
            width: dimensions.width,
            height: dimensions.height,
        },
    };
    tracing::debug!(?dimensions, "grayscale done");

    let mut current = &gray;

    let mut median_out = None;
    let median = config.median.then(|| {
        let (out, duration) = timed(clock, || {
            crate::median::median_blur(current, config.median_radius)
        });
        let side = 2 * u64::from(config.median_radius) + 1;
        median_out = Some(out);
        StageDiagnostics {
            duration,
            metrics: StageMetrics::Median {
                radius: config.median_radius,
                window_samples: side * side,
            },
        }
    });
    if let Some(ref m) = median_out {
        current = m;
        tracing::debug!(radius = config.median_radius, "median blur done");
    }

    let mut sobel_out = None;
    let sobel = config.sobel.then(|| {
        let (out, duration) = timed(clock, || crate::edge::sobel(current));
        let edge_pixel_count = count_nonzero(&out);
        sobel_out = Some(out);
        StageDiagnostics {
            duration,
            metrics: StageMetrics::Sobel {
                edge_pixel_count,
                total_pixel_count: pixel_count,
            },
        }
    });
    if let Some(ref s) = sobel_out {
        current = s;
        tracing::debug!("sobel done");
    }

    let mode = binarize_mode(config);
    let mut binarized_out = None;
    let binarize = mode.map(|mode| {
        let (out, duration) = timed(clock, || match mode {
            BinarizeMode::Adaptive { window_size, c } => {
                crate::threshold::adaptive_threshold(current, window_size, c)
            }
            BinarizeMode::Global { threshold } => {
                crate::threshold::global_threshold(current, threshold)
            }
        });
        let dark_pixel_count = count_dark(&out);
        binarized_out = Some(out);
        tracing::debug!(?mode, dark_pixel_count, "binarization done");
        StageDiagnostics {
            duration,
            metrics: StageMetrics::Binarize {
                mode,
                dark_pixel_count,
                total_pixel_count: pixel_count,
            },
        }
    });

    let staged = StagedResult {
        original: source.clone(),
        enhanced,
        grayscale: gray,
        median: median_out,
        sobel: sobel_out,
        binarized: binarized_out,
        dimensions,
    };

    let mut diagnostics = PipelineDiagnostics {
        clahe,
        unsharp,
        grayscale,
        median,
        sobel,
        binarize,
        total_duration: clock.elapsed(&total_start),
        summary: PipelineSummary {
            image_width: dimensions.width,
            image_height: dimensions.height,
            pixel_count,
            stage_count: 0,
        },
    };
    diagnostics.summary.stage_count = diagnostics.stages().len();

    (staged, diagnostics)
}

/// Which binarization `config` selects, if any.
///
/// Adaptive wins over a global threshold when both are set.
pub(crate) fn binarize_mode(config: &StageConfig) -> Option<BinarizeMode> {
    if config.adaptive {
        Some(BinarizeMode::Adaptive {
            window_size: config.window_size,
            c: config.c,
        })
    } else {
        config
            .threshold
            .map(|threshold| BinarizeMode::Global { threshold })
    }
}
