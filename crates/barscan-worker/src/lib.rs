//! Web worker entry point for barscan frame preprocessing.
//!
//! This crate compiles to a standalone WASM module that runs inside a
//! `Worker`. The scanner's main thread grabs a camera frame, crops the
//! scan band, and posts the raw RGBA bytes with a JSON `StageConfig`.
//! The worker runs the enhancement pre-pass and the pipeline, then posts
//! the final buffer and every intermediate stage back.
//!
//! Pixel data travels as raw `Uint8Array` buffers; only the config and
//! errors are JSON. Keeping the per-frame work here leaves the main
//! thread free to keep the video preview smooth.

use barscan_pipeline::{PipelineError, PixelBuffer, StageConfig, StagedResult};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// A decoded request from the main thread.
struct FrameRequest {
    source: PixelBuffer,
    config: StageConfig,
}

/// Message protocol: the main thread sends a JS object with:
/// - `pixels`: `Uint8Array` of raw RGBA samples, row-major
/// - `width`, `height`: `f64` frame dimensions
/// - `configJson`: `String` containing a JSON `StageConfig` (missing
///   fields take their defaults)
/// - `generation`: `f64` counter, passed through to the response
///
/// On success the worker responds with:
/// - `generation`, `ok: true`, `width`, `height`
/// - `finalPixels`: `Uint8Array`, the last buffer the pipeline produced
/// - `grayscalePixels`, and `enhancedPixels`, `medianPixels`,
///   `sobelPixels`, `binarizedPixels` for each stage that ran
///
/// On error the worker responds with:
/// - `generation`, `ok: false`
/// - `errorJson`: `String`, a JSON-serialized `PipelineError`
///
/// # Worker entry point
///
/// Called automatically when the WASM module is instantiated in the
/// worker context.
#[wasm_bindgen(start)]
pub fn worker_main() {
    let global: web_sys::DedicatedWorkerGlobalScope = js_sys::global()
        .dyn_into()
        .expect_throw("not running in a DedicatedWorkerGlobalScope");

    let onmessage =
        Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |event: web_sys::MessageEvent| {
            handle_message(&event);
        });
    global.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget(); // lives for the worker lifetime
}

/// Handle one frame from the main thread.
fn handle_message(event: &web_sys::MessageEvent) {
    let data = event.data();
    let generation = get(&data, "generation")
        .and_then(|v| v.as_f64())
        .unwrap_or(f64::NAN);

    match read_request(&data) {
        Ok(request) => {
            // Synchronous; blocks this worker thread only.
            let staged = barscan_pipeline::process_staged(&request.source, &request.config);
            post_success_response(generation, &staged);
        }
        Err(e) => post_error(generation, &e),
    }
}

/// Read a field off a JS object.
fn get(object: &JsValue, key: &str) -> Option<JsValue> {
    js_sys::Reflect::get(object, &JsValue::from_str(key))
        .ok()
        .filter(|v| !v.is_undefined())
}

/// Read a non-negative integral dimension.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn dimension(data: &JsValue, key: &str) -> Result<u32, PipelineError> {
    let value = get(data, key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| PipelineError::InvalidConfig(format!("{key} is missing or not a number")))?;
    if value.fract() != 0.0 || !(0.0..=f64::from(u32::MAX)).contains(&value) {
        return Err(PipelineError::InvalidConfig(format!(
            "{key} must be a non-negative integer, got {value}"
        )));
    }
    Ok(value as u32)
}

/// Validate and convert the request fields.
fn read_request(data: &JsValue) -> Result<FrameRequest, PipelineError> {
    let width = dimension(data, "width")?;
    let height = dimension(data, "height")?;

    let pixels: js_sys::Uint8Array = get(data, "pixels")
        .and_then(|v| v.dyn_into().ok())
        .ok_or_else(|| PipelineError::InvalidConfig("pixels is not a Uint8Array".to_string()))?;
    let source = barscan_pipeline::pixel_buffer_from_raw(width, height, pixels.to_vec())?;

    let config: StageConfig = match get(data, "configJson").and_then(|v| v.as_string()) {
        Some(json) => serde_json::from_str(&json).map_err(|e| {
            PipelineError::InvalidConfig(format!("failed to parse config: {e}"))
        })?,
        None => StageConfig::default(),
    };
    config.validate()?;

    Ok(FrameRequest { source, config })
}

/// Post the staged result back to the main thread.
///
/// Pixel buffers are sent as raw `Uint8Array`s with no JSON encoding.
#[allow(clippy::expect_used)]
fn post_success_response(generation: f64, staged: &StagedResult) {
    let response = js_sys::Object::new();
    let set = |key: &str, val: &JsValue| {
        js_sys::Reflect::set(&response, &JsValue::from_str(key), val)
            .expect_throw("failed to set response field");
    };
    let pixels = |buffer: &PixelBuffer| js_sys::Uint8Array::from(buffer.as_raw().as_slice());

    set("generation", &JsValue::from_f64(generation));
    set("ok", &JsValue::from_bool(true));
    set(
        "width",
        &JsValue::from_f64(f64::from(staged.dimensions.width)),
    );
    set(
        "height",
        &JsValue::from_f64(f64::from(staged.dimensions.height)),
    );
    set("finalPixels", &pixels(staged.final_image()));
    set("grayscalePixels", &pixels(&staged.grayscale));

    let optional = [
        ("enhancedPixels", staged.enhanced.as_ref()),
        ("medianPixels", staged.median.as_ref()),
        ("sobelPixels", staged.sobel.as_ref()),
        ("binarizedPixels", staged.binarized.as_ref()),
    ];
    for (key, buffer) in optional
        .into_iter()
        .filter_map(|(key, buffer)| Some((key, buffer?)))
    {
        set(key, &pixels(buffer));
    }

    let global: web_sys::DedicatedWorkerGlobalScope = js_sys::global()
        .dyn_into()
        .expect_throw("not in worker scope");
    global
        .post_message(&response)
        .expect_throw("failed to postMessage");
}

/// Post an error response back to the main thread.
fn post_error(generation: f64, error: &PipelineError) {
    let error_json = serde_json::to_string(error)
        .unwrap_or_else(|ser_err| format!("\"serialization error: {ser_err}\""));

    let response = js_sys::Object::new();
    let _ = js_sys::Reflect::set(
        &response,
        &JsValue::from_str("generation"),
        &JsValue::from_f64(generation),
    );
    let _ = js_sys::Reflect::set(
        &response,
        &JsValue::from_str("ok"),
        &JsValue::from_bool(false),
    );
    let _ = js_sys::Reflect::set(
        &response,
        &JsValue::from_str("errorJson"),
        &JsValue::from_str(&error_json),
    );

    if let Ok(global) = js_sys::global().dyn_into::<web_sys::DedicatedWorkerGlobalScope>() {
        let _ = global.post_message(&response);
    }
}
