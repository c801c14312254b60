//! Error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::errors::AgentError;

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// An `AgentError` on its way out as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub AgentError);

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AgentError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AgentError::NotFound(_) => StatusCode::NOT_FOUND,
            AgentError::AuthMissing => StatusCode::BAD_REQUEST,
            AgentError::AuthInvalid => StatusCode::FORBIDDEN,
            AgentError::PipelineError { .. } => match self.0.root() {
                AgentError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_REQUEST,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match &self.0 {
            AgentError::ValidationError(_) => "bad_request",
            AgentError::NotFound(_) => "not_found",
            AgentError::AuthMissing => "missing_signature",
            AgentError::AuthInvalid => "forbidden",
            AgentError::PipelineError { .. } => "update_failed",
            _ => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        let body = match &self.0 {
            AgentError::PipelineError { step, source } => {
                ErrorResponse::new(self.kind(), format!("{} failed", step))
                    .with_details(source.to_string())
            }
            other => ErrorResponse::new(self.kind(), other.to_string()),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
