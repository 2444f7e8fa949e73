//! Client visible errors of the HTTP service

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::contexts::{AgentRunnerError, ExecutionError, PopulateError};
use crate::render::RenderError;
use crate::spec_parser::SpecParseError;

/// Longest `detail` sent to clients, in characters
pub const MAX_DETAIL_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Request body exceeds the configured size limit")]
    PayloadTooLarge,

    #[error("Failed to parse the OpenAPI specification: {0}")]
    SpecParse(#[from] SpecParseError),

    #[error("Generation service error: {0}")]
    UpstreamRejected(String),

    #[error("The generation service did not answer within {seconds}s. Reduce the request size or retry later.")]
    UpstreamTimeout { seconds: u64 },

    #[error("Code generation failed: {0}")]
    UpstreamCall(String),

    #[error("{0}")]
    ResponseDecode(String),

    #[error("Failed to render test code: {0}")]
    Render(#[from] RenderError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::SpecParse(_) | Self::UpstreamRejected(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamCall(_) | Self::ResponseDecode(_) | Self::Render(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The message sent to the client, bounded to [`MAX_DETAIL_CHARS`]
    pub fn detail(&self) -> String {
        truncate_detail(&self.to_string())
    }
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Timeout { seconds } => Self::UpstreamTimeout { seconds },
            ExecutionError::Upstream(_) | ExecutionError::EmptyResponse => {
                Self::UpstreamCall(err.to_string())
            }
            ExecutionError::ModelNotFound(_) | ExecutionError::InvalidRegistry(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<PopulateError> for ApiError {
    fn from(err: PopulateError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<AgentRunnerError> for ApiError {
    fn from(err: AgentRunnerError) -> Self {
        match err {
            AgentRunnerError::Populate(e) => e.into(),
            AgentRunnerError::Execution(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge;
        }
        Self::InvalidInput(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // full detail stays in the log, the client gets the bounded message
        error!(status = status.as_u16(), error = %self, "request failed");
        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}

/// Cuts `message` to [`MAX_DETAIL_CHARS`] characters, appending `...` when cut
pub fn truncate_detail(message: &str) -> String {
    match message.char_indices().nth(MAX_DETAIL_CHARS) {
        Some((idx, _)) => format!("{}...", &message[..idx]),
        None => message.to_string(),
    }
}
