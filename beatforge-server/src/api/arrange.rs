use axum::{http::StatusCode, Json};
use base64::Engine;
use beatforge_core::cancellation::CancellationToken;
use std::time::Instant;

use crate::error::{ArrangeError, Result};
use crate::models::arrange::{ArrangeRequest, ArrangeResponse};

pub async fn arrange_handler(
    Json(req): Json<ArrangeRequest>,
) -> Result<(StatusCode, Json<ArrangeResponse>)> {
    let start = Instant::now();

    let pcm_bytes = base64::engine::general_purpose::STANDARD
        .decode(&req.pcm_base64)
        .map_err(|e| ArrangeError::InvalidPayload(e.to_string()))?;

    tracing::debug!(bytes = pcm_bytes.len(), theme = %req.parameters.theme, "arranging clip");

    let token = CancellationToken::new();
    let output = tokio::task::spawn_blocking(move || {
        beatforge_core::run_pipeline(&pcm_bytes, &req.parameters, &token)
    })
    .await
    .map_err(|e| ArrangeError::JoinError(e.to_string()))??;

    let response = ArrangeResponse {
        midi_base64: base64::engine::general_purpose::STANDARD.encode(&output.midi_bytes),
        wav_base64: base64::engine::general_purpose::STANDARD.encode(&output.wav_bytes),
        decisions: output.decisions,
        warnings: output.warnings,
        processing_time_ms: start.elapsed().as_millis(),
    };

    tracing::info!(
        lanes = output.arrangement.lanes_in_order().len(),
        elapsed_ms = response.processing_time_ms,
        "arrangement complete"
    );

    Ok((StatusCode::OK, Json(response)))
}
