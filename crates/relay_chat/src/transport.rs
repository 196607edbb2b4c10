//! Transport seam: mutable, length-limited chat messages.
//!
//! Transport failures are values, not exceptions: [`TransportError`]
//! distinguishes transient errors (retried by the engine with backoff)
//! from fatal ones (session aborted, last rendered state kept).

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::provider::DirectResult;

/// Hard per-message text length limit imposed by the transport.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Errors surfaced by transport operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Rate limited, retry after {0:?}")]
    RateLimited(Duration),

    #[error("Request timed out")]
    TimedOut,

    #[error("Message rejected as malformed")]
    Malformed,

    #[error("Transport error: {0}")]
    Unknown(String),
}

impl TransportError {
    /// Transient errors are retried inside the engine; fatal ones abort
    /// the session.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::TimedOut)
    }

    /// Wait the transport asked for, if it specified one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(wait) => Some(*wait),
            _ => None,
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Rendering applied to message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Markdown,
}

/// Kind of chat, which affects edit cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
}

/// A chat the bot can post into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatRef {
    pub id: i64,
    pub kind: ChatKind,
}

impl ChatRef {
    pub fn private(id: i64) -> Self {
        Self {
            id,
            kind: ChatKind::Private,
        }
    }

    pub fn group(id: i64) -> Self {
        Self {
            id,
            kind: ChatKind::Group,
        }
    }
}

/// Handle to a sent message, used for later edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

/// Messaging transport with mutable, length-limited messages.
///
/// Implementations enforce [`MAX_MESSAGE_LEN`] and surface their rate
/// limiting as [`TransportError::RateLimited`] so the engine can back off.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post a new message and return a handle for editing it.
    async fn create_message(
        &self,
        chat: &ChatRef,
        text: &str,
        format: TextFormat,
    ) -> TransportResult<MessageRef>;

    /// Replace the text of a previously sent message.
    async fn edit_message(
        &self,
        message: &MessageRef,
        text: &str,
        format: TextFormat,
    ) -> TransportResult<()>;

    /// Side channel for out-of-band artifacts (files, links, photos).
    async fn deliver_artifact(
        &self,
        chat: &ChatRef,
        artifact: &DirectResult,
    ) -> TransportResult<()>;
}
