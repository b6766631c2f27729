use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use dialogue_core::{GenerateError, VoiceError};

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Speaker '{0}' not found")]
    SpeakerNotFound(String),

    #[error("Invalid or missing API key")]
    Unauthorized,

    #[error("Server is still initializing")]
    NotReady,

    #[error("Generation produced no audio")]
    EmptyGeneration,

    #[error("Generation timed out after {0:.1}s")]
    GenerationTimedOut(f64),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Encoding error: {0}")]
    EncodingError(#[from] anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl ApiError {
    /// Machine-readable failure category, stable across message wording.
    pub fn category(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) | ApiError::SpeakerNotFound(_) => "validation",
            ApiError::Unauthorized => "unauthorized",
            ApiError::NotReady => "not_ready",
            ApiError::GenerationTimedOut(_) => "timeout",
            ApiError::EmptyGeneration | ApiError::GenerationFailed(_) => "generation",
            ApiError::EncodingError(_) => "encoding",
            ApiError::InternalError(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) | ApiError::SpeakerNotFound(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::GenerationTimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::EmptyGeneration
            | ApiError::GenerationFailed(_)
            | ApiError::EncodingError(_)
            | ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GenerateError> for ApiError {
    fn from(e: GenerateError) -> Self {
        match e {
            GenerateError::Empty => ApiError::EmptyGeneration,
            GenerateError::TimedOut { waited } => {
                ApiError::GenerationTimedOut(waited.as_secs_f64())
            }
            GenerateError::Failed(reason) => ApiError::GenerationFailed(reason),
        }
    }
}

impl From<VoiceError> for ApiError {
    fn from(e: VoiceError) -> Self {
        match e {
            VoiceError::SpeakerNotFound(name) => ApiError::SpeakerNotFound(name),
            VoiceError::NotEnoughVoices { .. } => ApiError::InvalidInput(e.to_string()),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    category: &'static str,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let category = self.category();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!("{category} error: {message}");
        }

        let body = Json(ErrorResponse {
            error: message,
            category,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}
