//! Request pipeline: admission, generation, delivery, accounting.
//!
//! One inbound message flows through the gate, then (if admitted) a
//! provider stream is rendered by the delivery engine and the final token
//! count is posted to the ledger. Everything past admission is fail-soft:
//! provider and transport errors are reported into the chat and logged,
//! never propagated out of the handling task.

use std::sync::Arc;
use tracing::{info, warn, Instrument};

use relay_core::{
    AdmissionGate, Decision, DenyReason, Feature, JoinWorkflow, UsageAmount, UsageLedger,
};

use crate::engine::DeliveryEngine;
use crate::error::ChatResult;
use crate::provider::{ChatMessage, ModelProvider};
use crate::transport::{ChatRef, ChatTransport, TextFormat};

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Shown to an unknown or pending identity; their join request is filed
/// as a side effect.
pub const JOIN_REQUEST_PROMPT: &str =
    "You don't have access yet. A join request has been submitted for review.";

pub const BLOCKED_NOTICE: &str = "You are not permitted to use this service.";
pub const FEATURE_DISABLED_NOTICE: &str = "That capability is currently disabled.";
pub const BUDGET_EXHAUSTED_NOTICE: &str =
    "Your usage budget for this period is exhausted. Please try again later.";

/// One inbound chat message, already resolved to a stable identity.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub identity_id: String,
    pub display_name: String,
    pub chat: ChatRef,
    pub text: String,
}

/// The assembled bot: every collaborator behind a seam so the pipeline
/// is testable without a network.
pub struct RelayBot {
    gate: AdmissionGate,
    ledger: Arc<UsageLedger>,
    workflow: JoinWorkflow,
    provider: Arc<dyn ModelProvider>,
    engine: DeliveryEngine,
    transport: Arc<dyn ChatTransport>,
}

impl RelayBot {
    pub fn new(
        gate: AdmissionGate,
        ledger: Arc<UsageLedger>,
        workflow: JoinWorkflow,
        provider: Arc<dyn ModelProvider>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            gate,
            ledger,
            workflow,
            provider,
            engine: DeliveryEngine::new(transport.clone()),
            transport,
        }
    }

    /// Handle one inbound message end to end.
    ///
    /// Returns `Err` only for store failures during admission; generation
    /// and delivery failures are handled in place.
    pub async fn handle_message(&self, incoming: &IncomingMessage) -> ChatResult<()> {
        match self.gate.authorize(&incoming.identity_id, Feature::Chat)? {
            Decision::Deny(DenyReason::Unapproved) => {
                self.workflow
                    .request_join(&incoming.identity_id, &incoming.display_name)?;
                info!(identity = %incoming.identity_id, "join request filed");
                self.send_notice(&incoming.chat, JOIN_REQUEST_PROMPT).await;
            }
            Decision::Deny(reason) => {
                info!(identity = %incoming.identity_id, %reason, "message denied");
                self.send_notice(&incoming.chat, denial_notice(&reason)).await;
            }
            Decision::Allow => {
                // Each admitted request gets its own span for correlating
                // the provider, engine and ledger logs.
                let request_id = uuid::Uuid::new_v4();
                let span = tracing::info_span!("request", id = %request_id, identity = %incoming.identity_id);
                self.run_request(incoming).instrument(span).await;
            }
        }
        Ok(())
    }

    async fn run_request(&self, incoming: &IncomingMessage) {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(incoming.text.clone()),
        ];

        let stream = match self.provider.chat_stream(&messages).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(identity = %incoming.identity_id, error = %e, "could not start completion");
                self.send_notice(&incoming.chat, crate::engine::STREAM_FAILURE_NOTICE)
                    .await;
                return;
            }
        };

        match self.engine.deliver(&incoming.chat, stream).await {
            Ok(outcome) => {
                self.ledger.record_best_effort(
                    &incoming.identity_id,
                    UsageAmount::ChatTokens(outcome.total_tokens),
                );
            }
            Err(e) => {
                // The engine already rendered what it could; just log.
                warn!(identity = %incoming.identity_id, error = %e, "delivery aborted");
            }
        }
    }

    async fn send_notice(&self, chat: &ChatRef, text: &str) {
        if let Err(e) = self
            .transport
            .create_message(chat, text, TextFormat::Plain)
            .await
        {
            warn!(error = %e, "could not deliver notice");
        }
    }
}

fn denial_notice(reason: &DenyReason) -> &'static str {
    match reason {
        DenyReason::Blocked => BLOCKED_NOTICE,
        DenyReason::Unapproved => JOIN_REQUEST_PROMPT,
        DenyReason::FeatureDisabled => FEATURE_DISABLED_NOTICE,
        DenyReason::BudgetExhausted => BUDGET_EXHAUSTED_NOTICE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{EventStream, ProviderResult, StreamEvent};
    use crate::transport::{MessageRef, TransportError, TransportResult};
    use futures::stream::{self, StreamExt};
    use relay_core::{
        BudgetPeriod, Identity, IdentityStatus, IdentityStore, MemoryStore, Prices, RelayConfig,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingProvider {
        calls: AtomicUsize,
        answer: String,
        tokens: u64,
    }

    impl CountingProvider {
        fn new(answer: &str, tokens: u64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                answer: answer.to_string(),
                tokens,
            }
        }
    }

    #[async_trait::async_trait]
    impl ModelProvider for CountingProvider {
        async fn chat_stream(&self, _messages: &[ChatMessage]) -> ProviderResult<EventStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let events: Vec<ProviderResult<StreamEvent>> = vec![
                Ok(StreamEvent::partial(&self.answer[..self.answer.len() / 2])),
                Ok(StreamEvent::finished(self.answer.clone(), self.tokens)),
            ];
            Ok(stream::iter(events).boxed())
        }
    }

    #[derive(Default)]
    struct NoticeTransport {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ChatTransport for NoticeTransport {
        async fn create_message(
            &self,
            chat: &ChatRef,
            text: &str,
            _format: TextFormat,
        ) -> TransportResult<MessageRef> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(MessageRef {
                chat_id: chat.id,
                message_id: 1,
            })
        }

        async fn edit_message(
            &self,
            _message: &MessageRef,
            text: &str,
            _format: TextFormat,
        ) -> TransportResult<()> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn deliver_artifact(
            &self,
            _chat: &ChatRef,
            _artifact: &crate::provider::DirectResult,
        ) -> TransportResult<()> {
            Err(TransportError::Unknown("not supported".to_string()))
        }
    }

    fn bot_with(
        store: Arc<MemoryStore>,
        provider: Arc<CountingProvider>,
        transport: Arc<NoticeTransport>,
        config: &RelayConfig,
    ) -> (RelayBot, Arc<UsageLedger>) {
        let ledger = Arc::new(UsageLedger::from_config(store.clone(), config));
        let gate = AdmissionGate::new(store.clone(), ledger.clone(), config);
        let workflow = JoinWorkflow::new(store);
        let bot = RelayBot::new(gate, ledger.clone(), workflow, provider, transport);
        (bot, ledger)
    }

    fn incoming(identity_id: &str) -> IncomingMessage {
        IncomingMessage {
            identity_id: identity_id.to_string(),
            display_name: "Sam".to_string(),
            chat: ChatRef::private(7),
            text: "hello".to_string(),
        }
    }

    #[tokio::test]
    async fn test_pending_identity_never_reaches_provider() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(&Identity::new("sam", "Sam"))
            .unwrap();
        let provider = Arc::new(CountingProvider::new("never", 0));
        let transport = Arc::new(NoticeTransport::default());
        let (bot, _) = bot_with(
            store,
            provider.clone(),
            transport.clone(),
            &RelayConfig::default(),
        );

        bot.handle_message(&incoming("sam")).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            transport.sent.lock().unwrap().as_slice(),
            &[JOIN_REQUEST_PROMPT.to_string()]
        );
    }

    #[tokio::test]
    async fn test_unknown_identity_gets_join_request_filed() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(CountingProvider::new("never", 0));
        let transport = Arc::new(NoticeTransport::default());
        let (bot, _) = bot_with(
            store.clone(),
            provider,
            transport,
            &RelayConfig::default(),
        );

        bot.handle_message(&incoming("newcomer")).await.unwrap();

        let identity = store.get("newcomer").unwrap().unwrap();
        assert_eq!(identity.status, IdentityStatus::Pending);
    }

    #[tokio::test]
    async fn test_approved_identity_is_answered_and_charged() {
        let store = Arc::new(MemoryStore::new());
        let mut identity = Identity::new("sam", "Sam");
        identity.status = IdentityStatus::Approved;
        store.put(&identity).unwrap();

        let config = RelayConfig {
            allowed_ids: vec!["sam".to_string()],
            budget_period: BudgetPeriod::Monthly,
            prices: Prices::default(),
            ..RelayConfig::default()
        };
        let provider = Arc::new(CountingProvider::new("the answer is 42", 1000));
        let transport = Arc::new(NoticeTransport::default());
        let (bot, ledger) = bot_with(store, provider.clone(), transport.clone(), &config);

        bot.handle_message(&incoming("sam")).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            transport.sent.lock().unwrap().last().unwrap(),
            "the answer is 42"
        );
        // 1000 tokens at the default price
        let report = ledger.report("sam").unwrap();
        assert!((report.month.cost - Prices::default().token_price).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_blocked_identity_gets_blocked_notice() {
        let store = Arc::new(MemoryStore::new());
        let mut identity = Identity::new("sam", "Sam");
        identity.status = IdentityStatus::Blocked;
        store.put(&identity).unwrap();

        let provider = Arc::new(CountingProvider::new("never", 0));
        let transport = Arc::new(NoticeTransport::default());
        let (bot, _) = bot_with(
            store,
            provider.clone(),
            transport.clone(),
            &RelayConfig::default(),
        );

        bot.handle_message(&incoming("sam")).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            transport.sent.lock().unwrap().as_slice(),
            &[BLOCKED_NOTICE.to_string()]
        );
    }
}
