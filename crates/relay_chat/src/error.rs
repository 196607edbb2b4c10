//! Error types for the chat crate.

use thiserror::Error;

use crate::provider::ProviderError;
use crate::transport::TransportError;

/// Result type alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors that can abort a request-handling task.
///
/// Transient transport errors never appear here; the engine retries them
/// internally. Ledger write failures never appear here either, they are
/// logged and swallowed on the request path.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The model back-end failed mid-stream
    #[error("Provider stream failed: {0}")]
    Provider(#[from] ProviderError),

    /// The transport rejected an operation fatally
    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Core(#[from] relay_core::CoreError),
}
