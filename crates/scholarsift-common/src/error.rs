use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::categories::category_codes;
use crate::models::Source;

/// A client asked for an arXiv category outside the accepted set.
/// Never retried; surfaced to HTTP callers as 400.
#[derive(Debug, Clone, Error)]
#[error("invalid arXiv category '{category}'; valid options: {}", .valid.join(", "))]
pub struct InvalidCategoryError {
    pub category: String,
    pub valid: Vec<&'static str>,
}

impl InvalidCategoryError {
    pub fn new(category: impl Into<String>) -> Self {
        Self { category: category.into(), valid: category_codes() }
    }
}

/// One engine failed. Contained by the orchestrator: logged and excluded.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{engine} request failed: {message}")]
    Network { engine: Source, message: String },

    #[error("{engine} rate limit still exceeded after {attempts} attempts")]
    RateLimited { engine: Source, attempts: u32 },

    #[error("{engine} returned HTTP {status}: {message}")]
    Upstream { engine: Source, status: u16, message: String },

    #[error("{engine} response could not be parsed: {message}")]
    Parse { engine: Source, message: String },

    #[error(transparent)]
    InvalidCategory(#[from] InvalidCategoryError),
}

impl EngineError {
    pub fn network(engine: Source, err: impl std::fmt::Display) -> Self {
        EngineError::Network { engine, message: err.to_string() }
    }

    pub fn parse(engine: Source, err: impl std::fmt::Display) -> Self {
        EngineError::Parse { engine, message: err.to_string() }
    }

    pub fn engine(&self) -> Source {
        match self {
            EngineError::Network { engine, .. }
            | EngineError::RateLimited { engine, .. }
            | EngineError::Upstream { engine, .. }
            | EngineError::Parse { engine, .. } => *engine,
            EngineError::InvalidCategory(_) => Source::Arxiv,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, EngineError::InvalidCategory(_))
    }
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_)   => StatusCode::NOT_FOUND,
            ApiError::Internal(_)   => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<InvalidCategoryError> for ApiError {
    fn from(err: InvalidCategoryError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}
