//! The model call contract.
//!
//! A thin, provider-agnostic `async_trait` that turns a message history
//! into a response, with usage accounting attached. The core only needs
//! the contract — concrete vendor adapters are out of scope — so this
//! module carries the trait and message types but no vendor
//! implementations. Scripted test doubles live under `#[cfg(test)]` in
//! [`crate::consensus::engine`] tests and in `tests/`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::CoreError;

/// Conversation roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// One part of a (possibly multimodal) message body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { url: String },
}

/// A single conversation turn. Histories are append-only per round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentPart::Text { text: text.into() }],
            timestamp: chrono::Utc::now(),
        }
    }

    /// Concatenate all text parts, ignoring non-text content. Used by merge
    /// rules and prompt assembly that only care about the textual body.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Sampling parameters for one model call. `temperature` is set per-round by
/// [`crate::consensus::temperature`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingOpts {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// One model invocation.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model_id: String,
    pub messages: Vec<Message>,
    pub sampling: SamplingOpts,
}

/// Token accounting returned alongside a completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    Error,
}

/// The response half of the model call contract.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: Usage,
    pub finish_reason: FinishReason,
    pub meta: HashMap<String, serde_json::Value>,
}

/// Provider-agnostic abstraction over a concrete LLM backend.
///
/// Implementations **must** be `Send + Sync`: agents hold these behind an
/// `Arc` and call them from concurrent consensus-round tasks. Errors are
/// classified through [`CoreError`]'s [`crate::error::ErrorKind`] so the
/// consensus engine can distinguish a parseable-but-wrong reply from a
/// provider-level authentication/forbidden failure, which is filtered out
/// of a round rather than counted as a vote.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Stable identifier used in an agent's ordered `models` set.
    fn model_id(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CoreError>;
}
