//! llmcacheproxy HTTP server binary.
//!
//! Starts an axum HTTP server that caches completions from an upstream LLM
//! inference backend.
//!
//! # Environment Variables
//!
//! - `UPSTREAM_URL` — base URL of the upstream inference server (required)
//! - `BIND_HOST` — bind address (default: `0.0.0.0`)
//! - `BIND_PORT` — bind port (default: `8080`)
//! - `CACHE_DIR` — directory holding the journal (default: `$HOME/.llmcacheproxy`)
//! - `VERBOSE` — raise the tracing filter to debug (default: `false`)
//! - `UPSTREAM_TIMEOUT_SECS` — upstream HTTP timeout in seconds (default: `300`)
//! - `RUST_LOG` — tracing filter override
//!
//! # Exit codes
//!
//! - `0` — clean shutdown
//! - `1` — failed to bind or to create the cache directory
//! - `2` — missing required configuration (`UPSTREAM_URL`)

use std::process::ExitCode;
use std::sync::Arc;

use llmcacheproxy::cache_engine::CacheEngine;
use llmcacheproxy::config::Config;
use llmcacheproxy::journal::Journal;
use llmcacheproxy::server::{app_router, AppState};
use llmcacheproxy::store::Store;
use llmcacheproxy::upstream::UpstreamClient;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
            |_| {
                if config.verbose {
                    "info,llmcacheproxy=debug".into()
                } else {
                    "info".into()
                }
            },
        ))
        .init();

    if let Err(e) = std::fs::create_dir_all(&config.cache_dir) {
        tracing::error!(error = %e, dir = %config.cache_dir.display(), "failed to create cache directory");
        return ExitCode::from(1);
    }

    let journal_path = config.journal_path();
    let store = Store::new();
    let loaded = match Journal::open(&journal_path, |fp, completion| store.load(fp, completion)).await {
        Ok(journal) => journal,
        Err(e) => {
            tracing::error!(error = %e, "failed to open journal");
            return ExitCode::from(1);
        }
    };

    tracing::info!(num_keys = store.keys_count(), "journal loaded");

    let engine = Arc::new(CacheEngine::new(store, loaded));
    let upstream = UpstreamClient::new(config.upstream_url.clone(), config.upstream_timeout);
    let state = AppState {
        engine: Arc::clone(&engine),
        upstream,
        cache_file: journal_path,
    };

    let app = app_router(state);
    let bind_addr = format!("{}:{}", config.bind_host, config.bind_port);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %bind_addr, "failed to bind");
            return ExitCode::from(1);
        }
    };

    tracing::info!("llmcacheproxy listening on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  POST /generate              — native-dialect generation");
    tracing::info!("  POST /v1/completions        — chat/completion-dialect text completion");
    tracing::info!("  POST /v1/chat/completions   — chat/completion-dialect chat completion");
    tracing::info!("  GET  /cache/stats           — cache statistics");
    tracing::info!("  POST /cache/clear           — empty the cache");
    tracing::info!("  GET  /cache/info            — stats plus journal path");
    tracing::info!("  GET  /health                — liveness probe");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(e) = result {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("draining journal before exit");
    engine.shutdown().await;

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl_c handler");
    tracing::info!("shutdown signal received");
}
