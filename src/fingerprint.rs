//! Request fingerprinting (C1), per `SPEC_FULL.md` §4.1.
//!
//! Turns a native-dialect request into a stable 256-bit fingerprint that
//! excludes the sample count `n`, plus the extracted `n` itself.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::domain::{Fingerprint, NativeRequest, SamplingParams};
use crate::error::AppError;

/// Default sample count when `n` is absent from sampling params.
pub const DEFAULT_N: u32 = 1;

/// Rejects a present-but-non-positive or non-integer `n` with a
/// `ClientValidation` error (422), per `SPEC_FULL.md` §7. Called on the
/// pipeline's boundary, before the request ever reaches the fingerprinter,
/// which otherwise treats an unparsable `n` as merely absent.
pub fn validate_n(params: &SamplingParams) -> Result<(), AppError> {
    match params.get("n") {
        None => Ok(()),
        Some(v) => {
            let valid = v.as_i64().is_some_and(|n| n > 0);
            if valid {
                Ok(())
            } else {
                Err(AppError::ClientValidation {
                    message: format!("n must be a positive integer, got {v}"),
                })
            }
        }
    }
}

/// Fingerprint a native request and extract its sample count.
///
/// `n` is read out of `sampling_params` (and excluded from the hash) rather
/// than mutating the caller's request — the cache engine reads it back from
/// the return value instead of a parameter that's no longer present.
pub fn fingerprint(req: &NativeRequest) -> (Fingerprint, u32) {
    let prompt_value = effective_prompt_value(req);

    let mut params = req.sampling_params.clone();
    let n = extract_n(&mut params);

    let envelope = json!({
        "prompt": prompt_value,
        "params": Value::Object(params),
    });

    let canonical = canonical_json_bytes(&envelope);
    let digest = Sha256::digest(&canonical);
    (Fingerprint::from_bytes(digest.into()), n)
}

/// Serializes the request's effective prompt to a raw [`Value`] without
/// going through [`crate::domain::Prompt`]'s own (De)serialize impl, so the
/// message-object key order is exactly whatever `canonical_json_bytes`
/// decides (lexicographic), matching the spec's "sorted at every depth"
/// rule rather than the narrative "role, content" construction order.
fn effective_prompt_value(req: &NativeRequest) -> Value {
    serde_json::to_value(req.effective_prompt()).unwrap_or(Value::Null)
}

/// Removes `n` from `params` and returns it, defaulting to 1 when absent.
///
/// A non-positive or non-integer `n` is left for the pipeline's
/// `ClientValidation` check to catch; the fingerprinter just treats
/// anything it can't parse as an unsigned integer as "absent".
fn extract_n(params: &mut SamplingParams) -> u32 {
    params
        .remove("n")
        .and_then(|v| v.as_u64())
        .and_then(|n| u32::try_from(n).ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_N)
}

/// Renders a JSON value as canonical bytes: keys sorted lexicographically
/// at every depth, no insignificant whitespace, shortest round-trip number
/// form.
///
/// This leans on `serde_json::Value`'s `Map` being a `BTreeMap` (the
/// `preserve_order` feature is not enabled anywhere in this crate — see
/// `Cargo.toml`) so `to_vec` already emits sorted keys; this function exists
/// as the single named place that property is relied upon and tested.
pub fn canonical_json_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).expect("Value serialization is infallible")
}
