//! # llmcacheproxy
//!
//! A caching HTTP reverse proxy that sits in front of an LLM inference
//! backend. Requests are fingerprinted on everything except their sample
//! count, looked up in an in-memory store backed by an append-only on-disk
//! journal, and only the shortfall is forwarded upstream.
//!
//! Both the native dialect and an OpenAI-ish chat/completion dialect are
//! served from the same cache.

pub mod cache_engine;
pub mod config;
pub mod dialect;
pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod journal;
pub mod server;
pub mod store;
pub mod upstream;

pub use cache_engine::CacheEngine;
pub use config::Config;
pub use error::AppError;
pub use server::{app_router, AppState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
