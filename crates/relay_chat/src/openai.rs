//! OpenAI chat-completions adapter, streaming variant.
//!
//! Turns the server-sent-event wire format into the [`StreamEvent`]
//! contract: each delta is appended to an accumulator and emitted as a
//! full-text snapshot, and the `[DONE]` marker yields the terminal event
//! carrying the total token count from the usage record.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::provider::{
    ChatMessage, EventStream, ModelProvider, ProviderError, ProviderResult, StreamEvent,
};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o";

/// Streaming OpenAI back-end.
pub struct OpenAiProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Create a provider with explicit configuration
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client: reqwest::Client::new(),
        }
    }

    /// Create a provider from environment variables
    ///
    /// Reads `OPENAI_API_KEY`, with an optional model override from
    /// `RELAY_OPENAI_MODEL`.
    pub fn from_env() -> ProviderResult<Self> {
        let custom_model = std::env::var("RELAY_OPENAI_MODEL").ok();
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProviderError::Api("OPENAI_API_KEY is not set".to_string()))?;
        Ok(Self::new(api_key, custom_model))
    }

    /// Get the current model
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn chat_stream(&self, messages: &[ChatMessage]) -> ProviderResult<EventStream> {
        let request = StreamRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        };

        let response = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!(
                "OpenAI API error {}: {}",
                status, body
            )));
        }

        let events = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ProviderError::Network(e.to_string())))
            .scan(SseAccumulator::default(), |acc, chunk| {
                let batch = match chunk {
                    Ok(bytes) => acc.feed(&bytes),
                    Err(e) => vec![Err(e)],
                };
                futures::future::ready(Some(stream::iter(batch)))
            })
            .flatten()
            .boxed();

        Ok(events)
    }
}

/// Incremental SSE decoder.
///
/// Network chunks do not align with event boundaries, so raw bytes are
/// buffered until a full line is available.
#[derive(Default)]
struct SseAccumulator {
    buf: String,
    accumulated: String,
    total_tokens: u64,
    done: bool,
}

impl SseAccumulator {
    fn feed(&mut self, bytes: &[u8]) -> Vec<ProviderResult<StreamEvent>> {
        self.buf.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        while let Some(newline) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=newline).collect();
            if let Some(event) = self.process_line(line.trim_end()) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<ProviderResult<StreamEvent>> {
        let payload = line.strip_prefix("data: ")?;
        if self.done {
            return None;
        }
        if payload == "[DONE]" {
            self.done = true;
            return Some(Ok(StreamEvent::finished(
                self.accumulated.clone(),
                self.total_tokens,
            )));
        }

        let chunk: ChunkResponse = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => return Some(Err(ProviderError::Parse(e.to_string()))),
        };

        if let Some(usage) = chunk.usage {
            self.total_tokens = usage.total_tokens;
        }

        let delta = chunk
            .choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())?;
        if delta.is_empty() {
            return None;
        }
        self.accumulated.push_str(delta);
        Some(Ok(StreamEvent::partial(self.accumulated.clone())))
    }
}

#[derive(Debug, Serialize)]
struct StreamRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChunkResponse {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<ChunkUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TokenMarker;

    fn delta_line(content: &str) -> String {
        format!(
            "data: {{\"choices\": [{{\"delta\": {{\"content\": \"{}\"}}}}]}}\n\n",
            content
        )
    }

    #[test]
    fn test_deltas_accumulate_into_snapshots() {
        let mut acc = SseAccumulator::default();
        let events = acc.feed(delta_line("Hel").as_bytes());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().content, "Hel");

        let events = acc.feed(delta_line("lo there").as_bytes());
        assert_eq!(events[0].as_ref().unwrap().content, "Hello there");
    }

    #[test]
    fn test_line_split_across_network_chunks() {
        let mut acc = SseAccumulator::default();
        let line = delta_line("partial");
        let (head, tail) = line.split_at(20);

        assert!(acc.feed(head.as_bytes()).is_empty());
        let events = acc.feed(tail.as_bytes());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().content, "partial");
    }

    #[test]
    fn test_done_marker_carries_usage_total() {
        let mut acc = SseAccumulator::default();
        acc.feed(delta_line("answer").as_bytes());
        acc.feed(b"data: {\"choices\": [], \"usage\": {\"total_tokens\": 57}}\n\n");

        let events = acc.feed(b"data: [DONE]\n\n");
        assert_eq!(events.len(), 1);
        let event = events[0].as_ref().unwrap();
        assert_eq!(event.content, "answer");
        assert_eq!(event.marker, TokenMarker::Finished(57));
    }

    #[test]
    fn test_non_data_lines_are_ignored() {
        let mut acc = SseAccumulator::default();
        assert!(acc.feed(b": keep-alive\n\n").is_empty());
        assert!(acc.feed(b"event: ping\n").is_empty());
    }

    #[test]
    fn test_malformed_payload_is_a_parse_error() {
        let mut acc = SseAccumulator::default();
        let events = acc.feed(b"data: {not json}\n");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(ProviderError::Parse(_))));
    }

    #[test]
    fn test_default_and_custom_model() {
        let provider = OpenAiProvider::new("key".to_string(), None);
        assert_eq!(provider.model(), "gpt-4o");

        let provider = OpenAiProvider::new("key".to_string(), Some("gpt-4o-mini".to_string()));
        assert_eq!(provider.model(), "gpt-4o-mini");
    }
}
