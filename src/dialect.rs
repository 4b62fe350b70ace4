//! Dialect adapter (C5), per `SPEC_FULL.md` §4.5.
//!
//! Translates between the native request/response shape the cache engine
//! and upstream speak, and the OpenAI-ish chat/completion dialect the
//! `/v1/*` routes speak. Field renames and the prompt-field priority rule
//! live here; the fingerprinter never sees a chat/completion-shaped
//! request directly.

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::{ChatMessage, Completion, NativeRequest, Role};
use crate::error::AppError;

/// Sampling parameters that pass through to `sampling_params` unchanged.
const PASSTHROUGH_PARAMS: &[&str] = &[
    "n",
    "temperature",
    "top_p",
    "stop",
    "presence_penalty",
    "frequency_penalty",
    "seed",
];

/// Builds a native request from a chat-completion-dialect JSON body.
///
/// `messages` (if present) becomes the native `prompt` field verbatim, per
/// §4.5 — counterintuitive, but that's the inbound mapping the spec
/// defines; `effective_prompt` on the native side re-interprets whichever
/// field ends up populated.
pub fn chat_to_native(body: &Value) -> Result<NativeRequest, AppError> {
    let obj = body.as_object().ok_or_else(|| AppError::ClientMalformed {
        message: "request body must be a JSON object".into(),
    })?;

    let model = obj.get("model").and_then(Value::as_str).map(str::to_string);

    let messages = match obj.get("messages") {
        Some(v) => Some(parse_chat_messages(v)?),
        None => None,
    };

    let prompt = messages.as_ref().map(|m| {
        serde_json::to_value(m).expect("Vec<ChatMessage> serialization is infallible")
    });

    Ok(NativeRequest {
        text: None,
        prompt,
        messages: None,
        sampling_params: extract_sampling_params(obj),
        model,
    })
}

/// Builds a native request from a completion-dialect (legacy, prompt-string)
/// JSON body. `prompt` becomes the native `text` field.
pub fn completion_to_native(body: &Value) -> Result<NativeRequest, AppError> {
    let obj = body.as_object().ok_or_else(|| AppError::ClientMalformed {
        message: "request body must be a JSON object".into(),
    })?;

    let model = obj.get("model").and_then(Value::as_str).map(str::to_string);

    let text = match obj.get("prompt") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            return Err(AppError::ClientMalformed {
                message: format!("prompt must be a string, got {other}"),
            })
        }
        None => None,
    };

    Ok(NativeRequest {
        text,
        prompt: None,
        messages: None,
        sampling_params: extract_sampling_params(obj),
        model,
    })
}

/// Pulls renamed + passthrough sampling parameters out of an inbound
/// chat/completion body, dropping everything else — unknown fields would
/// otherwise fingerprint into pointless cache misses.
fn extract_sampling_params(obj: &Map<String, Value>) -> Map<String, Value> {
    let mut params = Map::new();
    if let Some(v) = obj.get("max_tokens") {
        params.insert("max_new_tokens".to_string(), v.clone());
    }
    for key in PASSTHROUGH_PARAMS {
        if let Some(v) = obj.get(*key) {
            params.insert((*key).to_string(), v.clone());
        }
    }
    params
}

/// Parses a chat-dialect `messages` array, distinguishing a structurally
/// malformed entry (400) from a well-formed one naming an unrecognized role
/// (422) — the spec gives these two different status codes.
fn parse_chat_messages(value: &Value) -> Result<Vec<ChatMessage>, AppError> {
    let items = value.as_array().ok_or_else(|| AppError::ClientMalformed {
        message: "messages must be an array".into(),
    })?;

    items
        .iter()
        .map(|item| {
            let obj = item.as_object().ok_or_else(|| AppError::ClientMalformed {
                message: "each message must be an object".into(),
            })?;
            let role_str = obj
                .get("role")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::ClientMalformed {
                    message: "message is missing a string 'role'".into(),
                })?;
            let content = obj
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::ClientMalformed {
                    message: "message is missing a string 'content'".into(),
                })?
                .to_string();
            let role = parse_role(role_str)?;
            Ok(ChatMessage { role, content })
        })
        .collect()
}

fn parse_role(role: &str) -> Result<Role, AppError> {
    match role {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" => Ok(Role::Tool),
        other => Err(AppError::ClientValidation {
            message: format!("unknown role: {other}"),
        }),
    }
}

/// Re-shapes a batch of native completions into the legacy completion
/// dialect's response envelope. `id`/`created` are freshly minted on every
/// call, including cache hits — they are never part of what's cached.
pub fn native_to_completion_response(completions: &[Completion], model: Option<&str>) -> Value {
    let choices: Vec<Value> = completions
        .iter()
        .enumerate()
        .map(|(index, c)| {
            serde_json::json!({
                "index": index,
                "text": c.text(),
                "finish_reason": c.finish_reason(),
            })
        })
        .collect();

    serde_json::json!({
        "id": format!("cmpl-{}", Uuid::new_v4()),
        "object": "text_completion",
        "created": Utc::now().timestamp(),
        "model": model.unwrap_or("unknown"),
        "choices": choices,
    })
}

/// Re-shapes a batch of native completions into the chat-completion
/// dialect's response envelope.
pub fn native_to_chat_completion_response(completions: &[Completion], model: Option<&str>) -> Value {
    let choices: Vec<Value> = completions
        .iter()
        .enumerate()
        .map(|(index, c)| {
            serde_json::json!({
                "index": index,
                "message": { "role": "assistant", "content": c.text() },
                "finish_reason": c.finish_reason(),
            })
        })
        .collect();

    serde_json::json!({
        "id": format!("chatcmpl-{}", Uuid::new_v4()),
        "object": "chat.completion",
        "created": Utc::now().timestamp(),
        "model": model.unwrap_or("unknown"),
        "choices": choices,
    })
}
