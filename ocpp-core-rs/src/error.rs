//! Engine and transport errors

use thiserror::Error;

/// Errors surfaced synchronously by engine entry points
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("message pool exhausted and nothing can be evicted")]
    OutOfCapacity,

    #[error("message id {0} is already in use")]
    DuplicateId(String),

    #[error("invalid message id: {0:?}")]
    InvalidId(String),

    #[error("message {0} is not a request and cannot be answered")]
    NotARequest(String),

    #[error("identifier generator did not produce a usable id")]
    IdGeneration,
}

/// Errors reported by a `Transport` implementation.
///
/// The engine never returns these to the caller; a failed send counts as an
/// attempt and a failed receive is logged and ignored.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport not connected")]
    Disconnected,

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
