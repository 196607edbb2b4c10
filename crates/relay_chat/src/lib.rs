//! # relay_chat - Streaming delivery for the relay bot
//!
//! This crate adapts an incrementally-growing model answer to a turn-based
//! transport with hard per-message length limits:
//!
//! - [`provider`]: the lazy stream contract for model back-ends, plus the
//!   OpenAI chat-completions adapter
//! - [`transport`]: the create/edit message seam with an explicit
//!   transient-vs-fatal error type
//! - [`engine`]: the streaming delivery engine with cadence control,
//!   chunk roll-over and retry/backoff
//! - [`bot`]: the request pipeline wiring admission, provider, engine and
//!   ledger together
//!
//! ## Control flow
//!
//! ```text
//! inbound message ─▶ AdmissionGate ─▶ ModelProvider ─▶ DeliveryEngine
//!                                                          │
//!                                      UsageLedger ◀───────┘ (on completion)
//! ```

pub mod bot;
pub mod engine;
pub mod error;
pub mod openai;
pub mod provider;
pub mod transport;

pub use bot::*;
pub use engine::*;
pub use error::*;
pub use openai::*;
pub use provider::*;
pub use transport::*;
