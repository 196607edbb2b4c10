//! Model provider stream contract.
//!
//! A provider yields a lazy, finite, non-restartable sequence of
//! partial-answer snapshots. Each event carries the full accumulated text
//! so far plus a marker that is either "not finished yet" or the final
//! total token count. The contract is scheduling-agnostic: consumers only
//! need `Stream`, so providers may be backed by HTTP streaming, channels
//! or canned test data.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the model back-end.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed stream payload: {0}")]
    Parse(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Whether the stream has finished, and at what cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMarker {
    /// More events will follow
    NotFinished,
    /// Terminal event; total tokens consumed by the request
    Finished(u64),
}

/// One snapshot of the incrementally-growing answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// Full accumulated answer text so far
    pub content: String,
    pub marker: TokenMarker,
}

impl StreamEvent {
    pub fn partial(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            marker: TokenMarker::NotFinished,
        }
    }

    pub fn finished(content: impl Into<String>, total_tokens: u64) -> Self {
        Self {
            content: content.into(),
            marker: TokenMarker::Finished(total_tokens),
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self.marker, TokenMarker::Finished(_))
    }
}

/// The event sequence for one in-flight request.
pub type EventStream = BoxStream<'static, ProviderResult<StreamEvent>>;

/// Message role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single chat message sent to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// A model back-end producing answer streams.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Start a completion for the conversation and return its event stream.
    async fn chat_stream(&self, messages: &[ChatMessage]) -> ProviderResult<EventStream>;
}

/// An out-of-band artifact (file or link) replacing textual narration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectResult {
    /// Artifact kind, e.g. `photo`, `file`, `link`
    pub kind: String,
    /// Artifact location or payload reference
    pub value: String,
}

#[derive(Deserialize)]
struct DirectResultEnvelope {
    direct_result: DirectResult,
}

/// Detect the direct-result sentinel a tool-using provider may emit in
/// place of narration: `{"direct_result": {"kind": ..., "value": ...}}`.
pub fn parse_direct_result(content: &str) -> Option<DirectResult> {
    let trimmed = content.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    serde_json::from_str::<DirectResultEnvelope>(trimmed)
        .ok()
        .map(|envelope| envelope.direct_result)
}
