//! HTTP server for the caching reverse proxy.
//!
//! Exposes the cache engine and an upstream client as `axum::extract::State`
//! behind the native and chat/completion dialects.
//!
//! # Endpoints
//!
//! - `POST /generate`            — Native-dialect generation
//! - `POST /v1/completions`      — Chat/completion-dialect text completion
//! - `POST /v1/chat/completions` — Chat/completion-dialect chat completion
//! - `GET  /cache/stats`         — Cache statistics
//! - `POST /cache/clear`         — Empty the cache
//! - `GET  /cache/info`          — Stats plus the journal path
//! - `GET  /health`              — Liveness probe

pub mod routes;

pub use routes::{app_router, AppState};
