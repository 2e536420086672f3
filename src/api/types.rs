//! API response and error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use crate::decompose::DecomposeError;
use crate::llm::LlmError;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub decomposition: String,
    /// RFC 3339 timestamp of the check.
    pub timestamp: String,
}

/// Current decomposition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub planner_model: String,
    pub input_threshold: u64,
    pub output_threshold: u64,
    pub max_chunks: usize,
    pub max_tokens_per_chunk: u64,
    pub max_internal_calls: usize,
    pub planner_timeout_secs: u64,
    pub chunk_timeout_secs: u64,
}

/// `{"error": {...}}` body shared by every failure response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_summary: Option<String>,
}

impl ErrorBody {
    pub fn new(error_type: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                error_type: error_type.to_string(),
                estimated_cost: None,
                max_cost: None,
                plan_summary: None,
            },
        }
    }
}

/// Failure of an API handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Decompose(#[from] DecomposeError),
    #[error("Proxy error: {0}")]
    Proxy(#[from] LlmError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::Decompose(_) => StatusCode::BAD_REQUEST,
            Self::Proxy(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            Self::InvalidRequest(message) => ErrorBody::new("invalid_request", message.clone()),
            Self::Decompose(e) => match e {
                DecomposeError::Planner(_) => {
                    ErrorBody::new(e.error_type(), format!("Planning failed: {}", e))
                }
                DecomposeError::BudgetExceeded {
                    estimated_cost,
                    max_cost,
                    plan_summary,
                    ..
                } => {
                    let mut body = ErrorBody::new(e.error_type(), e.to_string());
                    body.error.estimated_cost = Some(*estimated_cost);
                    body.error.max_cost = Some(*max_cost);
                    body.error.plan_summary = Some(plan_summary.clone());
                    body
                }
            },
            Self::Proxy(_) => ErrorBody::new("proxy_error", self.to_string()),
            Self::Internal(message) => ErrorBody::new("internal_error", message.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
