//! Error types for the HTTP service.
//!
//! # Design Decisions
//! - Submission-time errors are returned synchronously to the caller
//! - Worker-side errors are logged (mismatch, sink append) or terminate the
//!   event loop (readiness query)
//! - Transport failures of an individual transfer are not errors of the
//!   service; they travel inside the delivered `Response`

use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::transport::TransferId;

/// Errors produced by the HTTP service and its transports.
#[derive(Debug, Error)]
pub enum Error {
    /// The transfer could not be created or configured.
    #[error("failed to initialize transfer for {url}: {reason}")]
    TransferInit { url: String, reason: String },

    /// A completion message referenced a transfer with no registered request.
    #[error("completion reported for unknown transfer {0}")]
    CompletionMismatch(TransferId),

    /// The transport could not report readiness. Fatal to the event loop.
    #[error("readiness query failed: {0}")]
    ReadinessQuery(String),

    /// Received bytes could not be appended to a response buffer.
    #[error("failed to buffer {len} response bytes: {reason}")]
    SinkAppend { len: usize, reason: String },

    /// The service no longer accepts submissions.
    #[error("service is shutting down")]
    ShuttingDown,

    /// The request was dropped by the worker without completing.
    #[error("request abandoned before completion")]
    Abandoned,

    /// The event loop thread could not be started.
    #[error("failed to spawn event loop worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The transport runtime could not be built.
    #[error("failed to build transport runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The event loop thread panicked.
    #[error("event loop worker panicked")]
    WorkerPanicked,

    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Shorthand for a `TransferInit` error.
    pub fn transfer_init(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::TransferInit {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_init_message_names_url() {
        let err = Error::transfer_init("ftp://x", "unsupported scheme `ftp`");
        assert_eq!(
            err.to_string(),
            "failed to initialize transfer for ftp://x: unsupported scheme `ftp`"
        );
    }

    #[test]
    fn mismatch_message_names_transfer() {
        let err = Error::CompletionMismatch(TransferId::from_raw(7));
        assert_eq!(err.to_string(), "completion reported for unknown transfer transfer-7");
    }
}
