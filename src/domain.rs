//! Shared data types for the cache engine and the proxy pipeline.
//!
//! Corresponds to the data model in `SPEC_FULL.md` §3.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A chat message role.
///
/// Only the four roles the chat/completion dialect admits are recognized;
/// anything else is a `ClientValidation` error at the pipeline boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// One turn of a chat-style prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// The two prompt shapes the fingerprinter admits.
///
/// `untagged` so that on the wire a prompt is either a bare string or a bare
/// array of `{role, content}` objects — there is no discriminant field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    Text(String),
    Messages(Vec<ChatMessage>),
}

impl Default for Prompt {
    fn default() -> Self {
        Prompt::Text(String::new())
    }
}

/// An unordered mapping from sampling parameter name to JSON value.
///
/// Backed by `serde_json::Map`, which is a `BTreeMap` as long as the
/// `preserve_order` feature of `serde_json` is never enabled (it isn't, see
/// `Cargo.toml`) — this is what gives the fingerprinter lexicographic key
/// ordering for free instead of hand-rolled sorting.
pub type SamplingParams = Map<String, Value>;

/// The native-dialect request shape.
///
/// Mirrors the three possible prompt-bearing fields the native backend
/// accepts. `prompt` is typed as a raw [`Value`] rather than [`Prompt`]
/// because the dialect adapter populates it with a bare messages array
/// (see `dialect.rs`), and fingerprinting re-interprets whichever field is
/// present according to the same priority rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NativeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub sampling_params: SamplingParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl NativeRequest {
    /// Extracts the effective prompt per the `text > prompt > messages`
    /// priority rule, defaulting to an empty string when none are present.
    pub fn effective_prompt(&self) -> Prompt {
        if let Some(text) = &self.text {
            return Prompt::Text(text.clone());
        }
        if let Some(prompt) = &self.prompt {
            if let Ok(p) = serde_json::from_value::<Prompt>(prompt.clone()) {
                return p;
            }
        }
        if let Some(messages) = &self.messages {
            return Prompt::Messages(messages.clone());
        }
        Prompt::default()
    }
}

/// A 256-bit request fingerprint, modulo the sample count `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Error returned when a journal line's `key` field is not valid hex.
#[derive(Debug, thiserror::Error)]
#[error("invalid fingerprint hex: {0}")]
pub struct InvalidFingerprintHex(String);

impl FromStr for Fingerprint {
    type Err = InvalidFingerprintHex;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| InvalidFingerprintHex(s.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| InvalidFingerprintHex(s.to_string()))?;
        Ok(Fingerprint(arr))
    }
}

/// The opaque result of one generation.
///
/// The engine never interprets the contents — only the dialect adapter
/// reads `text`/`finish_reason` back out of it to re-shape a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Completion(pub Value);

impl Completion {
    pub fn text(&self) -> &str {
        self.0.get("text").and_then(Value::as_str).unwrap_or("")
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.0.get("finish_reason").and_then(Value::as_str)
    }
}

/// On-disk representation of one journal line: `{"key": "...", "value": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecordWire {
    pub key: String,
    pub value: Completion,
}

/// Process-local cache statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Stats {
    pub hits: u64,
    pub misses: u64,
    pub num_keys: u64,
    pub total_responses: u64,
    pub pending_writes: u64,
}
