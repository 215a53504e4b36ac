use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use beatforge_core::{PipelineError, PipelineErrorKind};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArrangeError {
    #[error("invalid base64 PCM payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("task join error: {0}")]
    JoinError(String),
}

impl IntoResponse for ArrangeError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ArrangeError::InvalidPayload(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ArrangeError::JoinError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            ArrangeError::Pipeline(err) => (status_for_kind(&err.kind), err.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

fn status_for_kind(kind: &PipelineErrorKind) -> StatusCode {
    match kind {
        PipelineErrorKind::UnsupportedFormat(_)
        | PipelineErrorKind::Truncated(_)
        | PipelineErrorKind::ChunkMismatch(_)
        | PipelineErrorKind::TooShort
        | PipelineErrorKind::NoOnsets
        | PipelineErrorKind::TemplateUnknown(_)
        | PipelineErrorKind::ThemeUnknown(_) => StatusCode::BAD_REQUEST,
        PipelineErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub type Result<T> = std::result::Result<T, ArrangeError>;
