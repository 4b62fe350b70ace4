//! Axum route handlers for the caching proxy's HTTP server.
//!
//! # Routes
//!
//! - `POST /generate`              — Native-dialect generation.
//! - `POST /v1/completions`        — Chat/completion-dialect text completion.
//! - `POST /v1/chat/completions`   — Chat/completion-dialect chat completion.
//! - `GET  /cache/stats`           — Cache statistics.
//! - `POST /cache/clear`           — Empties the cache.
//! - `GET  /cache/info`            — Stats plus the journal file path.
//! - `GET  /health`                — Liveness probe.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cache_engine::CacheEngine;
use crate::dialect;
use crate::domain::NativeRequest;
use crate::error::AppError;
use crate::upstream::UpstreamClient;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CacheEngine>,
    pub upstream: UpstreamClient,
    pub cache_file: PathBuf,
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(generate_handler))
        .route("/v1/completions", post(completions_handler))
        .route("/v1/chat/completions", post(chat_completions_handler))
        .route("/cache/stats", get(stats_handler))
        .route("/cache/clear", post(clear_handler))
        .route("/cache/info", get(info_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the proxy pipeline (§4.6): lookup, fill the shortfall from
/// upstream, store what was generated, return the merged result.
async fn fulfill(state: &AppState, native: NativeRequest) -> Result<Vec<crate::domain::Completion>, AppError> {
    let lookup = state.engine.lookup(&native);

    if lookup.needed == 0 {
        tracing::info!(fingerprint = %lookup.fingerprint, "cache hit");
        return Ok(lookup.cached);
    }

    if lookup.cached.is_empty() {
        tracing::info!(fingerprint = %lookup.fingerprint, needed = lookup.needed, "cache miss");
    } else {
        tracing::info!(fingerprint = %lookup.fingerprint, cached = lookup.cached.len(), needed = lookup.needed, "partial hit");
    }

    let generated = state.upstream.generate(&native, lookup.needed).await?;
    state.engine.store(lookup.fingerprint, generated.clone());

    let mut result = lookup.cached;
    result.extend(generated);
    Ok(result)
}

/// POST /generate — native-dialect generation.
async fn generate_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let native: NativeRequest = serde_json::from_value(body).map_err(|e| AppError::ClientMalformed {
        message: e.to_string(),
    })?;
    crate::fingerprint::validate_n(&native.sampling_params)?;
    let requested_n = sampling_n(&native.sampling_params);

    let completions = fulfill(&state, native).await?;

    // Native → native: a scalar when n=1, otherwise a list of completions.
    let response = if requested_n == 1 {
        serde_json::to_value(&completions[0])
    } else {
        serde_json::to_value(&completions)
    }
    .map_err(|e| AppError::UpstreamProtocol {
        message: format!("encoding response: {e}"),
    })?;

    Ok(Json(response))
}

/// POST /v1/completions — chat/completion-dialect text completion.
async fn completions_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let model = body.get("model").and_then(Value::as_str).map(str::to_string);
    let native = dialect::completion_to_native(&body)?;
    crate::fingerprint::validate_n(&native.sampling_params)?;
    let completions = fulfill(&state, native).await?;
    Ok(Json(dialect::native_to_completion_response(
        &completions,
        model.as_deref(),
    )))
}

/// POST /v1/chat/completions — chat/completion-dialect chat completion.
async fn chat_completions_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let model = body.get("model").and_then(Value::as_str).map(str::to_string);
    let native = dialect::chat_to_native(&body)?;
    crate::fingerprint::validate_n(&native.sampling_params)?;
    let completions = fulfill(&state, native).await?;
    Ok(Json(dialect::native_to_chat_completion_response(
        &completions,
        model.as_deref(),
    )))
}

/// GET /cache/stats
async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.stats())
}

/// POST /cache/clear
async fn clear_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.clear();
    Json(serde_json::json!({ "cleared": true }))
}

/// GET /cache/info
async fn info_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut value = serde_json::to_value(state.engine.stats()).expect("Stats serialization is infallible");
    value["cache_file"] = serde_json::json!(state.cache_file.display().to_string());
    Json(value)
}

/// GET /health — liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "llmcacheproxy",
    }))
}

fn sampling_n(params: &serde_json::Map<String, Value>) -> u32 {
    params
        .get("n")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|&n| n > 0)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::Journal;
    use crate::store::Store;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn test_state() -> (AppState, TempDir) {
        let dir = TempDir::new().unwrap();
        let cache_file = dir.path().join("cache.jsonl");
        let journal = Journal::open(&cache_file, |_, _| {}).await.unwrap();
        let engine = Arc::new(CacheEngine::new(Store::new(), journal));
        // Upstream URL is unused unless a test actually triggers a miss
        // against it; no handler test below does, so a bogus URL is fine.
        let upstream = UpstreamClient::new("http://127.0.0.1:0".to_string(), std::time::Duration::from_secs(1));
        (
            AppState {
                engine,
                upstream,
                cache_file: cache_file.clone(),
            },
            dir,
        )
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let (state, _dir) = test_state().await;
        let app = app_router(state);

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "llmcacheproxy");
    }

    #[tokio::test]
    async fn cache_stats_starts_at_zero() {
        let (state, _dir) = test_state().await;
        let app = app_router(state);

        let request = Request::builder().uri("/cache/stats").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["hits"], 0);
        assert_eq!(json["misses"], 0);
        assert_eq!(json["num_keys"], 0);
    }

    #[tokio::test]
    async fn cache_clear_reports_cleared_true() {
        let (state, _dir) = test_state().await;
        let app = app_router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/cache/clear")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["cleared"], true);
    }

    #[tokio::test]
    async fn cache_info_reports_the_journal_path() {
        let (state, _dir) = test_state().await;
        let cache_file = state.cache_file.clone();
        let app = app_router(state);

        let request = Request::builder().uri("/cache/info").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["cache_file"], cache_file.display().to_string());
    }

    #[tokio::test]
    async fn generate_rejects_a_non_json_body() {
        let (state, _dir) = test_state().await;
        let app = app_router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/generate")
            .header("Content-Type", "application/json")
            .body(Body::from("not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn generate_rejects_a_non_positive_n() {
        let (state, _dir) = test_state().await;
        let app = app_router(state);

        let body = serde_json::json!({"text": "hi", "sampling_params": {"n": 0}});
        let request = Request::builder()
            .method("POST")
            .uri("/generate")
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn chat_completions_rejects_an_unknown_role() {
        let (state, _dir) = test_state().await;
        let app = app_router(state);

        let body = serde_json::json!({"messages": [{"role": "narrator", "content": "hi"}]});
        let request = Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn generate_on_a_prewarmed_cache_serves_without_calling_upstream() {
        let (state, _dir) = test_state().await;
        let (fp, _n) = crate::fingerprint::fingerprint(&NativeRequest {
            text: Some("The capital of France is".into()),
            ..Default::default()
        });
        state.engine.store(
            fp,
            vec![crate::domain::Completion(serde_json::json!({"text": " Paris", "finish_reason": "stop"}))],
        );

        let app = app_router(state);
        let body = serde_json::json!({"text": "The capital of France is"});
        let request = Request::builder()
            .method("POST")
            .uri("/generate")
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["text"], " Paris");
    }

    #[tokio::test]
    async fn cross_dialect_cache_sharing_on_a_prewarmed_cache() {
        let (state, _dir) = test_state().await;
        let (fp, _n) = crate::fingerprint::fingerprint(&NativeRequest {
            text: Some("The capital of France is".into()),
            ..Default::default()
        });
        state.engine.store(
            fp,
            vec![crate::domain::Completion(serde_json::json!({"text": " Paris"}))],
        );

        let app = app_router(state);
        let body = serde_json::json!({"prompt": "The capital of France is"});
        let request = Request::builder()
            .method("POST")
            .uri("/v1/completions")
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["object"], "text_completion");
        assert_eq!(json["choices"][0]["text"], " Paris");
    }
}
