use beatforge_core::{Parameters, PipelineWarning};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ArrangeRequest {
    pub pcm_base64: String,
    pub parameters: Parameters,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ArrangeResponse {
    pub midi_base64: String,
    pub wav_base64: String,
    pub decisions: Vec<beatforge_core::model::DecisionRecord>,
    pub warnings: Vec<PipelineWarning>,
    pub processing_time_ms: u128,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
}
