//! barscan-bench: CLI tool for preprocessing parameter experimentation.
//!
//! Loads an image file, optionally crops the scan band, runs the
//! enhancement pre-pass and the preprocessing pipeline with configurable
//! parameters, and prints detailed per-stage diagnostics. Useful for:
//!
//! - Tuning the adaptive threshold window and constant
//! - Comparing CLAHE / unsharp settings on poorly lit captures
//! - Measuring per-stage durations at realistic frame sizes
//! - Checking whether a QR code still decodes after preprocessing
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin barscan-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod decode;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use barscan_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use barscan_pipeline::{Dimensions, PixelBuffer, RegionOfInterest, StageConfig, StagedResult};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::decode::{Decoder, QrDecoder, decode_hybrid};

/// Preprocessing parameter experimentation and diagnostics for barscan.
///
/// Runs the preprocessing pipeline on a given image with configurable
/// parameters and prints per-stage timing and pixel-count diagnostics.
#[derive(Parser)]
#[command(name = "barscan-bench", version)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Apply median blur after grayscale conversion.
    #[arg(long)]
    median: bool,

    /// Median neighborhood radius.
    #[arg(long, default_value_t = StageConfig::DEFAULT_MEDIAN_RADIUS)]
    median_radius: u32,

    /// Apply Sobel edge enhancement.
    #[arg(long)]
    sobel: bool,

    /// Apply adaptive (local mean) binarization.
    #[arg(long)]
    adaptive: bool,

    /// Adaptive threshold window size in pixels.
    #[arg(long, default_value_t = StageConfig::DEFAULT_WINDOW_SIZE)]
    window_size: u32,

    /// Constant subtracted from the local mean.
    #[arg(long, default_value_t = StageConfig::DEFAULT_C, allow_negative_numbers = true)]
    c: f64,

    /// Global threshold used when adaptive binarization is off.
    #[arg(long)]
    threshold: Option<f64>,

    /// Apply CLAHE in the enhancement pre-pass.
    #[arg(long)]
    clahe: bool,

    /// CLAHE tile size in pixels.
    #[arg(long, default_value_t = StageConfig::DEFAULT_CLAHE_TILE_SIZE)]
    clahe_tile_size: u32,

    /// CLAHE histogram clip limit.
    #[arg(long, default_value_t = StageConfig::DEFAULT_CLAHE_CLIP_LIMIT)]
    clahe_clip_limit: u32,

    /// Apply unsharp masking in the enhancement pre-pass.
    #[arg(long)]
    unsharp: bool,

    /// Unsharp mask blur radius.
    #[arg(long, default_value_t = StageConfig::DEFAULT_UNSHARP_RADIUS)]
    unsharp_radius: u32,

    /// Unsharp mask amount.
    #[arg(long, default_value_t = StageConfig::DEFAULT_UNSHARP_AMOUNT)]
    unsharp_amount: f64,

    /// Full stage config as a JSON string.
    ///
    /// When provided, all other stage parameter flags are ignored.
    /// Missing fields take their default values.
    #[arg(long)]
    config_json: Option<String>,

    /// Region of interest as `x,y,width,height` fractions of the frame.
    ///
    /// Defaults to the centered scan band.
    #[arg(long, value_parser = parse_roi, conflicts_with = "full_frame")]
    roi: Option<RegionOfInterest>,

    /// Process the whole frame instead of the scan band.
    #[arg(long)]
    full_frame: bool,

    /// Write the final processed buffer to this PNG file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write every intermediate stage as a PNG into this directory.
    #[arg(long)]
    stages_dir: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Try to decode a QR code from the raw band, then the processed one.
    #[arg(long)]
    decode: bool,
}

/// Parse `x,y,width,height` into a [`RegionOfInterest`].
fn parse_roi(s: &str) -> Result<RegionOfInterest, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match parts[..] {
        [x, y, width, height] => Ok(RegionOfInterest {
            x,
            y,
            width,
            height,
        }),
        _ => Err(format!(
            "expected 4 comma-separated fractions, got {}",
            parts.len()
        )),
    }
}

/// Build a [`StageConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Either way the result is
/// validated before use.
fn config_from_cli(cli: &Cli) -> Result<StageConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        StageConfig {
            median: cli.median,
            median_radius: cli.median_radius,
            sobel: cli.sobel,
            adaptive: cli.adaptive,
            window_size: cli.window_size,
            c: cli.c,
            threshold: cli.threshold,
            clahe: cli.clahe,
            clahe_tile_size: cli.clahe_tile_size,
            clahe_clip_limit: cli.clahe_clip_limit,
            unsharp: cli.unsharp,
            unsharp_radius: cli.unsharp_radius,
            unsharp_amount: cli.unsharp_amount,
        }
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Region to crop: the whole frame, an explicit `--roi`, or the scan band.
fn roi_from_cli(cli: &Cli) -> RegionOfInterest {
    if cli.full_frame {
        RegionOfInterest::full()
    } else {
        cli.roi.unwrap_or_default()
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    let frame = match barscan_pipeline::grayscale::decode(&image_bytes) {
        Ok(frame) => frame,
        Err(e) => {
            eprintln!("Pipeline error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let source = barscan_pipeline::roi::crop(&frame, &roi_from_cli(&cli));
    if Dimensions::of(&source).is_empty() {
        tracing::warn!(
            frame_width = frame.width(),
            frame_height = frame.height(),
            "region of interest is empty; every stage will be a no-op"
        );
    }

    tracing::info!(
        path = %cli.image_path.display(),
        bytes = image_bytes.len(),
        width = source.width(),
        height = source.height(),
        runs = cli.runs,
        "input loaded"
    );
    eprintln!("Config: {config:#?}");
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let (staged, diagnostics) =
            barscan_pipeline::process_staged_with_diagnostics(&source, &config, &StdClock);

        if cli.json {
            match serde_json::to_string_pretty(&diagnostics) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            println!("{}", diagnostics.report());
        }

        // Side outputs on the first run only.
        if run == 0 {
            if let Some(ref path) = cli.output {
                write_png(staged.final_image(), path);
            }
            if let Some(ref dir) = cli.stages_dir {
                write_stages(&staged, dir);
            }
            if cli.decode {
                report_decode(&QrDecoder, &staged);
            }
        }

        all_diagnostics.push(diagnostics);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    // Print summary when multiple runs.
    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Save `buffer` as PNG, reporting the outcome on stderr.
fn write_png(buffer: &PixelBuffer, path: &Path) {
    match buffer.save_with_format(path, image::ImageFormat::Png) {
        Ok(()) => eprintln!(
            "PNG written to {} ({}x{})",
            path.display(),
            buffer.width(),
            buffer.height(),
        ),
        Err(e) => eprintln!("Error writing PNG to {}: {e}", path.display()),
    }
}

/// Write every buffer the staged run produced into `dir`.
fn write_stages(staged: &StagedResult, dir: &Path) {
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("Error creating {}: {e}", dir.display());
        return;
    }

    let stages = [
        ("original", Some(&staged.original)),
        ("enhanced", staged.enhanced.as_ref()),
        ("grayscale", Some(&staged.grayscale)),
        ("median", staged.median.as_ref()),
        ("sobel", staged.sobel.as_ref()),
        ("binarized", staged.binarized.as_ref()),
    ];
    for (name, buffer) in stages
        .into_iter()
        .filter_map(|(name, buffer)| Some((name, buffer?)))
    {
        write_png(buffer, &dir.join(format!("{name}.png")));
    }
}

/// Run the hybrid decode and print what was found.
fn report_decode<D: Decoder>(decoder: &D, staged: &StagedResult) {
    match decode_hybrid(decoder, &staged.original, staged.final_image()) {
        Some((decoded, source)) => println!(
            "Decoded {:?} from {source:?} frame: {}",
            decoded.format, decoded.text
        ),
        None => println!("No symbol decoded"),
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&PipelineDiagnostics) -> Option<Duration>;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<16} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(30));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("CLAHE", |d| d.clahe.as_ref().map(|s| s.duration)),
        ("Unsharp", |d| d.unsharp.as_ref().map(|s| s.duration)),
        ("Grayscale", |d| Some(d.grayscale.duration)),
        ("Median", |d| d.median.as_ref().map(|s| s.duration)),
        ("Sobel", |d| d.sobel.as_ref().map(|s| s.duration)),
        ("Binarize", |d| d.binarize.as_ref().map(|s| s.duration)),
    ];

    for (name, extractor) in stage_extractors {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(extractor)
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<16} {stage_mean:>10.3}ms");
    }
}
