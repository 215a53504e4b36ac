use sha2::{Digest, Sha256};
use thiserror::Error;

/// All failure kinds the pipeline can surface, per stage.
///
/// `TempoLowConfidence` and `EventsDroppedOutsideLookahead` are deliberately
/// absent here: both are recovered locally and reported on the result
/// instead of returned as errors (see `PipelineWarning`).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineErrorKind {
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("truncated audio data: {0}")]
    Truncated(String),

    #[error("WAV chunk mismatch: {0}")]
    ChunkMismatch(String),

    #[error("audio shorter than 100ms")]
    TooShort,

    #[error("no onsets detected in input")]
    NoOnsets,

    #[error("unknown template: {0}")]
    TemplateUnknown(String),

    #[error("unknown theme: {0}")]
    ThemeUnknown(String),

    #[error("pipeline cancelled")]
    Cancelled,
}

/// Structured failure surfaced to the caller: stage name, a SHA-256 hash of
/// the input PCM bytes, and a human-readable message. The caller can retry
/// with adjusted parameters using the stage/hash as a correlation key.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("[{stage}] {kind} (input_hash={input_hash})")]
pub struct PipelineError {
    pub stage: &'static str,
    pub input_hash: String,
    pub kind: PipelineErrorKind,
}

impl PipelineError {
    pub fn new(stage: &'static str, pcm_bytes: &[u8], kind: PipelineErrorKind) -> Self {
        Self {
            stage,
            input_hash: hash_input(pcm_bytes),
            kind,
        }
    }
}

pub fn hash_input(pcm_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pcm_bytes);
    format!("{:x}", hasher.finalize())
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type for individual pipeline stages that don't have direct access
/// to the original PCM bytes needed for a full `PipelineError`'s input hash.
/// The orchestrator in `pipeline.rs` wraps `StageResult` into `Result` with
/// the stage name and input hash attached.
pub type StageResult<T> = std::result::Result<T, PipelineErrorKind>;
