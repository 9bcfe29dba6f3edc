//! Error taxonomy shared by the API, the refresh engine and the explorer adapters.
//!
//! Upstream failures carry an explicit retriability classification so the refresh engine can
//! decide on cooldowns and the request orchestrator can decide on stale fallbacks without
//! inspecting message text.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Every fallible operation in the workspace returns this.
///
/// Rendered as `{ "error": { "code": "...", "message": "..." } }` when returned from a handler.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("chain {0} not found")]
    ChainNotFound(String),

    #[error("no explorer adapter configured for chain {0}")]
    UnsupportedChain(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("upstream rate limited: {0}")]
    RateLimited(String),

    #[error("upstream timeout: {0}")]
    Timeout(String),

    #[error("upstream request aborted: {0}")]
    Aborted(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("no usable upstream endpoint: {0}")]
    NoEndpoint(String),

    #[error("request quota exceeded for {0}")]
    Throttled(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Substrings that mark an upstream message as rate limiting.
const RATE_LIMIT_MARKERS: &[&str] = &["429", "rate limit", "too many requests"];
const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out"];
const ABORT_MARKERS: &[&str] = &["aborted"];

impl AppError {
    /// Maps a free-text upstream failure onto the error taxonomy.
    ///
    /// Adapters that only get a message back (HTTP client errors, explorer error payloads) go
    /// through here so the classification stays consistent across chains.
    pub fn from_upstream_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let matches = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

        if matches(RATE_LIMIT_MARKERS) {
            Self::RateLimited(message)
        } else if matches(TIMEOUT_MARKERS) {
            Self::Timeout(message)
        } else if matches(ABORT_MARKERS) {
            Self::Aborted(message)
        } else {
            Self::Upstream(message)
        }
    }

    /// Rate limiting only. Drives per-chain cooldowns in the refresh engine.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Failures worth answering with stale data instead of an error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Timeout(_) | Self::Aborted(_)
        )
    }

    /// Returns the machine-readable error code (e.g. "CHAIN_NOT_FOUND").
    pub fn code(&self) -> &'static str {
        match self {
            Self::ChainNotFound(_) => "CHAIN_NOT_FOUND",
            Self::UnsupportedChain(_) => "UNSUPPORTED_CHAIN",
            Self::InvalidQuery(_) => "INVALID_QUERY",
            Self::RateLimited(_) => "UPSTREAM_RATE_LIMITED",
            Self::Timeout(_) => "UPSTREAM_TIMEOUT",
            Self::Aborted(_) => "UPSTREAM_ABORTED",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::NoEndpoint(_) => "INTERNAL_ERROR",
            Self::Throttled(_) => "TOO_MANY_REQUESTS",
            Self::Database(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ChainNotFound(_) => StatusCode::NOT_FOUND,
            Self::UnsupportedChain(_) | Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited(_) | Self::Aborted(_) | Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Throttled(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::NoEndpoint(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (status, axum::Json(body)).into_response()
    }
}
