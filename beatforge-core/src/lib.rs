//! beatforge-core — offline audio-analysis-and-arrangement pipeline for a
//! beatboxing-to-arrangement tool: onset detection, feature extraction,
//! classification, tempo/beat-grid estimation, grid quantization, template
//! arrangement, MIDI encoding, and an offline subtractive synth renderer.
//!
//! Pure and synchronous end to end — no process-wide state, no async
//! runtime dependency. `beatforge-server` is the only place an HTTP/async
//! layer is wrapped around this crate.

pub mod model;
pub mod error;
pub mod cancellation;
pub mod calibration;

pub mod dsp;

pub mod decoder;
pub mod onset;
pub mod features;
pub mod classifier;
pub mod tempo;
pub mod quantize;
pub mod theme;
pub mod arranger;
pub mod midi;
pub mod synth;
pub mod pipeline;

// DSP primitives reused by `synth.rs`, kept under their teacher-given names.
pub mod envelope;
pub mod biquad_filter;
pub mod limiter;

pub use error::{PipelineError, PipelineErrorKind, Result, StageResult};
pub use model::{Parameters, PipelineOutput, PipelineWarning};
pub use pipeline::run as run_pipeline;
