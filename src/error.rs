//! Error taxonomy for the proxy, per `SPEC_FULL.md` §7.
//!
//! Corresponds in spirit to `utilities/errors.rs` in the teacher: a small
//! `thiserror` enum whose variants carry just enough context for a useful
//! log line, wired to the HTTP layer via `IntoResponse`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Body is not JSON, or is missing a required prompt field.
    #[error("malformed request: {message}")]
    ClientMalformed { message: String },

    /// Body parsed but failed validation (e.g. `n <= 0`, unknown role).
    #[error("invalid request: {message}")]
    ClientValidation { message: String },

    /// Upstream could not be reached at all (connection refused, DNS, timeout).
    #[error("upstream unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// Upstream responded but violated the expected protocol.
    #[error("upstream protocol error: {message}")]
    UpstreamProtocol { message: String },

    /// Journal write failed. Logged, never surfaced to the client — the
    /// in-memory store remains authoritative for the life of the process.
    #[error("cache journal write failed: {message}")]
    CacheIoTransient { message: String },

    /// Cache directory could not be created at startup. Fatal.
    #[error("cache directory unusable: {message}")]
    CacheIoFatal { message: String },
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::ClientMalformed { .. } => StatusCode::BAD_REQUEST,
            AppError::ClientValidation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            AppError::UpstreamProtocol { .. } => StatusCode::BAD_GATEWAY,
            // These two are not meant to reach IntoResponse in practice
            // (CacheIoTransient is swallowed on the request path per §7,
            // CacheIoFatal aborts startup before a router exists) but a
            // sane mapping keeps the type total.
            AppError::CacheIoTransient { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::CacheIoFatal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(error = %self, status = %status, "request failed");
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
