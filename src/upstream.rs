//! Upstream inference backend client, per `SPEC_FULL.md` §4.6 / §6.
//!
//! The backend is out-of-scope: this is just a thin `reqwest` wrapper that
//! POSTs a native-dialect request to `<upstream>/generate` and normalizes
//! whatever comes back (a bare object or an array of objects) into a list
//! of completions of the requested length.

use std::time::Duration;

use crate::domain::{Completion, NativeRequest};
use crate::error::AppError;

#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
}

impl UpstreamClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is valid");
        Self { client, base_url }
    }

    /// Requests exactly `needed` completions from the upstream's
    /// `/generate` endpoint. The response is normalized to a list and
    /// length-checked: fewer than `needed` is a gateway error, more is
    /// truncated with a warning.
    pub async fn generate(
        &self,
        request: &NativeRequest,
        needed: u32,
    ) -> Result<Vec<Completion>, AppError> {
        let mut body = serde_json::to_value(request).map_err(|e| AppError::UpstreamProtocol {
            message: format!("encoding upstream request: {e}"),
        })?;
        body["sampling_params"]["n"] = serde_json::json!(needed);

        let url = format!("{}/generate", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamProtocol {
                message: format!("upstream returned status {}", response.status()),
            });
        }

        let value: serde_json::Value =
            response.json().await.map_err(|e| AppError::UpstreamProtocol {
                message: format!("decoding upstream response: {e}"),
            })?;

        let mut completions = normalize(value);

        if (completions.len() as u32) < needed {
            return Err(AppError::UpstreamProtocol {
                message: format!(
                    "upstream returned {} completions, requested {needed}",
                    completions.len()
                ),
            });
        }
        if (completions.len() as u32) > needed {
            tracing::warn!(
                returned = completions.len(),
                requested = needed,
                "upstream returned more completions than requested, truncating"
            );
            completions.truncate(needed as usize);
        }

        Ok(completions)
    }
}

/// A native response is either a bare object or an array of objects;
/// normalize both into a `Vec<Completion>`.
fn normalize(value: serde_json::Value) -> Vec<Completion> {
    match value {
        serde_json::Value::Array(items) => items.into_iter().map(Completion).collect(),
        other => vec![Completion(other)],
    }
}
