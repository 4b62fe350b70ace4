//! Process configuration (C7), per `SPEC_FULL.md` §6.
//!
//! Read once at startup from environment variables — the surface is small
//! enough that a config crate would be ceremony, following
//! `chat/handler.rs::ChatConfig::from_env`'s pattern of plain `env::var`
//! reads with fallbacks.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required but was not set")]
    MissingRequired(&'static str),
    #[error("{0} could not be parsed: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub upstream_url: String,
    pub bind_host: String,
    pub bind_port: u16,
    pub cache_dir: PathBuf,
    pub verbose: bool,
    pub upstream_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let upstream_url =
            env::var("UPSTREAM_URL").map_err(|_| ConfigError::MissingRequired("UPSTREAM_URL"))?;

        let bind_host = env::var("BIND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let bind_port = match env::var("BIND_PORT") {
            Ok(v) => v
                .parse()
                .map_err(|_| ConfigError::Invalid("BIND_PORT", v))?,
            Err(_) => 8080,
        };

        let cache_dir = match env::var("CACHE_DIR") {
            Ok(v) => PathBuf::from(v),
            Err(_) => default_cache_dir(),
        };

        let verbose = match env::var("VERBOSE") {
            Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
            Err(_) => false,
        };

        let upstream_timeout_secs: u64 = match env::var("UPSTREAM_TIMEOUT_SECS") {
            Ok(v) => v
                .parse()
                .map_err(|_| ConfigError::Invalid("UPSTREAM_TIMEOUT_SECS", v))?,
            Err(_) => 300,
        };

        Ok(Self {
            upstream_url,
            bind_host,
            bind_port,
            cache_dir,
            verbose,
            upstream_timeout: Duration::from_secs(upstream_timeout_secs),
        })
    }

    /// Path to the journal file inside the cache directory.
    pub fn journal_path(&self) -> PathBuf {
        self.cache_dir.join("cache.jsonl")
    }
}

/// `$HOME/.llmcacheproxy`, modeled on `utilities/paths.rs::db_storage_path`'s
/// `$HOME`-based default, flattened to one hidden directory rather than an
/// XDG-style data-dir tree.
fn default_cache_dir() -> PathBuf {
    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".llmcacheproxy")
}
