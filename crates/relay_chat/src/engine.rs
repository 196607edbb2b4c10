//! Streaming delivery engine.
//!
//! Consumes a provider event stream and issues the minimum sequence of
//! create/edit operations such that the chat always shows a clean prefix
//! of the final answer and no message exceeds the transport length limit.
//!
//! Cadence control: an edit is only issued when the text has grown by more
//! than a cutoff derived from how long the message already is, inflated by
//! a penalty accumulated from transient transport errors. The penalty is
//! never reset within a session, so sustained rate limiting progressively
//! throttles edit frequency.
//!
//! Cancellation is cooperative: dropping the future returned by
//! [`DeliveryEngine::deliver`] stops all further transport calls without
//! undoing edits already sent.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use relay_core::split_into_chunks;

use crate::error::{ChatError, ChatResult};
use crate::provider::{parse_direct_result, DirectResult, EventStream, TokenMarker};
use crate::transport::{
    ChatKind, ChatRef, ChatTransport, MessageRef, TextFormat, TransportError, MAX_MESSAGE_LEN,
};

/// Appended when the provider fails mid-stream, after whatever partial
/// content was already rendered.
pub const STREAM_FAILURE_NOTICE: &str = "⚠️ The answer was interrupted. Please try again.";

/// Tunables for the delivery engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard per-message length limit of the transport
    pub message_limit: usize,
    /// Added to the cutoff after each transient transport error
    pub backoff_increment: usize,
    /// Wait before retrying when the transport gives no retry-after
    pub retry_wait: Duration,
    /// Pause after each accepted edit, easing pressure on the transport
    pub edit_pause: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            message_limit: MAX_MESSAGE_LEN,
            backoff_increment: 5,
            retry_wait: Duration::from_millis(500),
            edit_pause: Duration::from_millis(10),
        }
    }
}

/// Minimum growth in characters required before another edit is worth a
/// network call. Longer renders edit less often; group chats are throttled
/// harder because their rate budget is shared.
fn stream_cutoff(kind: ChatKind, content_len: usize) -> usize {
    match kind {
        ChatKind::Group => match content_len {
            len if len > 1000 => 180,
            len if len > 200 => 120,
            len if len > 50 => 90,
            _ => 50,
        },
        ChatKind::Private => match content_len {
            len if len > 1000 => 90,
            len if len > 200 => 45,
            len if len > 50 => 25,
            _ => 15,
        },
    }
}

/// Mutable state of one in-flight rendering session.
///
/// Owned exclusively by a single [`DeliveryEngine::deliver`] call and
/// discarded when the stream ends or errors.
#[derive(Debug, Default)]
struct StreamSession {
    /// Text of the last accepted render of the active message
    last_rendered_text: String,
    /// The actively edited message, if any content was shown yet
    message: Option<MessageRef>,
    /// Index of the chunk currently streaming into the active message
    chunk_cursor: usize,
    /// Cutoff penalty accumulated from transient transport errors;
    /// only ever grows within a session
    backoff: usize,
}

/// What a completed delivery produced.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    /// Terminal token count reported by the provider
    pub total_tokens: u64,
    /// Messages created in the chat (finished chunks plus the live one)
    pub messages_created: usize,
    /// Accepted edit operations
    pub edits_issued: usize,
    /// Set when the stream was replaced by an out-of-band artifact
    pub direct: Option<DirectResult>,
}

/// Drives one provider stream into the transport.
pub struct DeliveryEngine {
    transport: Arc<dyn ChatTransport>,
    config: EngineConfig,
}

impl DeliveryEngine {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self::with_config(transport, EngineConfig::default())
    }

    pub fn with_config(transport: Arc<dyn ChatTransport>, config: EngineConfig) -> Self {
        Self { transport, config }
    }

    /// Render the stream live into the chat.
    ///
    /// Transient transport errors are retried with backoff for the life of
    /// the stream. Fatal transport errors and provider errors abort the
    /// session, leaving the last successful render visible.
    pub async fn deliver(
        &self,
        chat: &ChatRef,
        mut stream: EventStream,
    ) -> ChatResult<DeliveryOutcome> {
        let mut session = StreamSession::default();
        let mut total_tokens = 0u64;
        let mut messages_created = 0usize;
        let mut edits_issued = 0usize;

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "provider stream failed mid-generation");
                    self.render_failure_notice(chat).await;
                    return Err(ChatError::Provider(e));
                }
            };

            let final_event = event.is_final();
            if let TokenMarker::Finished(tokens) = event.marker {
                total_tokens = tokens;
            }

            // A direct result replaces textual streaming entirely.
            if let Some(direct) = parse_direct_result(&event.content) {
                self.transport
                    .deliver_artifact(chat, &direct)
                    .await
                    .map_err(ChatError::Transport)?;
                return Ok(DeliveryOutcome {
                    total_tokens,
                    messages_created,
                    edits_issued,
                    direct: Some(direct),
                });
            }

            let mut content = event.content;
            if content.trim().is_empty() && !final_event {
                continue;
            }

            // Roll over once the accumulated text no longer fits a single
            // message: finalize the active message with the next-to-last
            // chunk and continue streaming into a fresh one.
            let chunks = split_into_chunks(&content, self.config.message_limit);
            if chunks.len() > 1 {
                content = chunks[chunks.len() - 1].clone();
                if session.chunk_cursor != chunks.len() - 1 {
                    session.chunk_cursor = chunks.len() - 1;
                    let finished = &chunks[chunks.len() - 2];
                    match session.message {
                        Some(message) => {
                            if let Err(e) = self
                                .edit_with_retry(&message, finished, TextFormat::Plain, &mut session)
                                .await
                            {
                                warn!(error = %e, "could not finalize full chunk; keeping last render");
                            }
                        }
                        None => {
                            self.create_with_retry(chat, finished, TextFormat::Plain, &mut session)
                                .await?;
                            messages_created += 1;
                        }
                    }
                    let format = if final_event {
                        TextFormat::Markdown
                    } else {
                        TextFormat::Plain
                    };
                    let message = self
                        .create_with_retry(chat, &content, format, &mut session)
                        .await?;
                    session.message = Some(message);
                    session.last_rendered_text = content;
                    messages_created += 1;
                    continue;
                }
            }

            match session.message {
                None => {
                    if content.is_empty() {
                        continue;
                    }
                    let format = if final_event {
                        TextFormat::Markdown
                    } else {
                        TextFormat::Plain
                    };
                    let message = self
                        .create_with_retry(chat, &content, format, &mut session)
                        .await?;
                    session.message = Some(message);
                    session.last_rendered_text = content;
                    messages_created += 1;
                }
                Some(message) => {
                    let cutoff =
                        stream_cutoff(chat.kind, content.chars().count()) + session.backoff;
                    let grown = content
                        .chars()
                        .count()
                        .abs_diff(session.last_rendered_text.chars().count())
                        > cutoff;
                    if grown || final_event {
                        let format = if final_event {
                            TextFormat::Markdown
                        } else {
                            TextFormat::Plain
                        };
                        self.edit_with_retry(&message, &content, format, &mut session)
                            .await?;
                        session.last_rendered_text = content;
                        edits_issued += 1;
                        tokio::time::sleep(self.config.edit_pause).await;
                    }
                }
            }
        }

        debug!(
            tokens = total_tokens,
            messages = messages_created,
            edits = edits_issued,
            "stream delivered"
        );
        Ok(DeliveryOutcome {
            total_tokens,
            messages_created,
            edits_issued,
            direct: None,
        })
    }

    /// Edit a message, retrying transient failures with backoff for as long
    /// as it takes. A markdown render rejected as malformed is retried once
    /// with plain formatting before the error becomes fatal.
    async fn edit_with_retry(
        &self,
        message: &MessageRef,
        text: &str,
        format: TextFormat,
        session: &mut StreamSession,
    ) -> ChatResult<()> {
        let mut format = format;
        loop {
            match self.transport.edit_message(message, text, format).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => {
                    session.backoff += self.config.backoff_increment;
                    let wait = e.retry_after().unwrap_or(self.config.retry_wait);
                    debug!(backoff = session.backoff, wait_ms = wait.as_millis() as u64, "transient edit failure");
                    tokio::time::sleep(wait).await;
                }
                Err(TransportError::Malformed) if format == TextFormat::Markdown => {
                    format = TextFormat::Plain;
                }
                Err(e) => return Err(ChatError::Transport(e)),
            }
        }
    }

    /// Create a message, retrying transient failures with backoff. Markdown
    /// falls back to plain formatting like edits do.
    async fn create_with_retry(
        &self,
        chat: &ChatRef,
        text: &str,
        format: TextFormat,
        session: &mut StreamSession,
    ) -> ChatResult<MessageRef> {
        let mut format = format;
        loop {
            match self.transport.create_message(chat, text, format).await {
                Ok(message) => return Ok(message),
                Err(e) if e.is_transient() => {
                    session.backoff += self.config.backoff_increment;
                    let wait = e.retry_after().unwrap_or(self.config.retry_wait);
                    debug!(backoff = session.backoff, wait_ms = wait.as_millis() as u64, "transient create failure");
                    tokio::time::sleep(wait).await;
                }
                Err(TransportError::Malformed) if format == TextFormat::Markdown => {
                    format = TextFormat::Plain;
                }
                Err(e) => return Err(ChatError::Transport(e)),
            }
        }
    }

    /// Best-effort notice after a provider failure; the partial answer
    /// already rendered stays as-is.
    async fn render_failure_notice(&self, chat: &ChatRef) {
        if let Err(e) = self
            .transport
            .create_message(chat, STREAM_FAILURE_NOTICE, TextFormat::Plain)
            .await
        {
            warn!(error = %e, "could not deliver failure notice");
        }
    }
}
