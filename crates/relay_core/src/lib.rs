//! # relay_core - Identity, admission and usage metering
//!
//! This crate provides the non-streaming half of the relay bot:
//! - Identity records and the join-request workflow (pending → approved/blocked)
//! - The admission gate that authorizes every inbound request
//! - The usage ledger with period-bucketed cost accounting and budgets
//! - The chunk splitter used to fit answers into transport-sized messages
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  AdmissionGate  │────▶│   UsageLedger   │────▶│   UsageStore    │
//! └────────┬────────┘     └─────────────────┘     └─────────────────┘
//!          │
//! ┌────────▼────────┐     ┌─────────────────┐
//! │  IdentityStore  │◀────│  JoinWorkflow   │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! All shared state lives behind the store traits; there are no process-wide
//! singletons. Stores are keyed by identity and safe for concurrent use.

pub mod config;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod split;
pub mod store;
pub mod types;
pub mod workflow;

pub use config::*;
pub use error::*;
pub use gate::*;
pub use ledger::*;
pub use split::*;
pub use store::*;
pub use types::*;
pub use workflow::*;
