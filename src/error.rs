//! Error taxonomy for the price-ingestion pipeline.
//!
//! Outcomes cross component boundaries as tagged variants, never as raised
//! exceptions. `CoreError` exists only at the REST boundary to give each
//! `FailureKind` a documented HTTP response shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

/// Failure kinds shared by `ScrapeOutcome` and the REST boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    Timeout,
    NetworkError,
    HttpStatus,
    ParseMiss,
    RobotsDeny,
    RateLimited,
    Blocked,
    BrowserError,
    DomainBlocked,
    InvalidUrl,
}

impl FailureKind {
    /// Transient kinds the Scrape Executor reports as `SoftFail` (spec §4.4).
    pub fn is_soft(self) -> bool {
        matches!(
            self,
            FailureKind::Timeout
                | FailureKind::NetworkError
                | FailureKind::RateLimited
                | FailureKind::BrowserError
        )
    }

    /// Whether a retry is permitted at all, ignoring the job's remaining
    /// attempt budget. `DOMAIN_BLOCKED` and `INVALID_URL` are never retried.
    pub fn is_retryable(self) -> bool {
        !self.is_never_retried()
    }

    /// Kinds the spec says are never retried, regardless of remaining attempts.
    pub fn is_never_retried(self) -> bool {
        matches!(self, FailureKind::DomainBlocked | FailureKind::InvalidUrl)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::NetworkError => "NETWORK_ERROR",
            FailureKind::HttpStatus => "HTTP_STATUS",
            FailureKind::ParseMiss => "PARSE_MISS",
            FailureKind::RobotsDeny => "ROBOTS_DENY",
            FailureKind::RateLimited => "RATE_LIMITED",
            FailureKind::Blocked => "BLOCKED",
            FailureKind::BrowserError => "BROWSER_ERROR",
            FailureKind::DomainBlocked => "DOMAIN_BLOCKED",
            FailureKind::InvalidUrl => "INVALID_URL",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Boundary error returned by the ingress API (§6/§7).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("domain blocked: {0}")]
    DomainBlocked(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("scrape failed: {kind}: {detail}")]
    ScrapeFailed { kind: FailureKind, detail: String },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            CoreError::InvalidInput(m) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", m.clone()),
            CoreError::DomainBlocked(m) => {
                (StatusCode::FORBIDDEN, "DOMAIN_BLOCKED", m.clone())
            }
            CoreError::NotFound(m) => (StatusCode::NOT_FOUND, "NOT_FOUND", m.clone()),
            CoreError::ScrapeFailed { kind, detail } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                kind.as_str(),
                detail.clone(),
            ),
            CoreError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: kind, message })).into_response()
    }
}
