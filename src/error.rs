//! Error types
//!
//! Crate-wide error used by the transport, server and client. Per-call
//! failures of the broker core live in [`BrokerError`].

use std::time::Duration;

use thiserror::Error;

pub use crate::broker::BrokerError;

/// Result type for transport, server and client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wire framing and decoding errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeded the configured maximum
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Frame was not valid UTF-8 JSON of the expected shape
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Response did not match any outstanding request
    #[error("unexpected response id {0}")]
    UnexpectedResponse(u64),

    /// Server replied with a shape that does not fit the request
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Server replied with an error code this client does not know
    #[error("remote error {code}: {message}")]
    Remote { code: String, message: String },
}

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}
