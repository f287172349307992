//! Error types for the relay pipeline.

use thiserror::Error;

use crate::rotation::InvalidRotation;

/// Errors surfaced by the registry, adapter, tracking-source client and session.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Tracking server unreachable.
    #[error("connect failed: {addr}: {reason}")]
    ConnectFailed {
        /// Address that was dialled.
        addr: String,
        /// Underlying failure.
        reason: String,
    },

    /// The server refused `TakeControl`.
    #[error("control denied: {0}")]
    ControlDenied(String),

    /// Parameter description and frame contents disagree.
    #[error("configuration mismatch: {declared} bodies declared, {reported} reported")]
    ConfigurationMismatch {
        /// Bodies declared by the parameter description.
        declared: usize,
        /// Bodies found in the frame or document.
        reported: usize,
    },

    /// Duplicate or otherwise unusable body declaration.
    #[error("invalid body declaration: {0}")]
    InvalidBodyDeclaration(String),

    /// Requested body is not in the registry.
    #[error("body not found: {0}")]
    BodyNotFound(String),

    /// Rotation matrix could not be converted.
    #[error("invalid rotation: {0}")]
    InvalidRotation(#[from] InvalidRotation),

    /// I/O failure on the tracking-source connection.
    #[error("stream transport error: {0}")]
    StreamTransport(String),

    /// Failure handing a pose to the consumer.
    #[error("consumer error: {0}")]
    Sink(String),

    /// Malformed packet or unexpected server reply.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Unusable configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    /// Creates a connect failure.
    #[must_use]
    pub fn connect_failed(addr: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConnectFailed {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a body count mismatch.
    #[must_use]
    pub const fn configuration_mismatch(declared: usize, reported: usize) -> Self {
        Self::ConfigurationMismatch { declared, reported }
    }

    /// Creates a body-not-found error.
    #[must_use]
    pub fn body_not_found(name: impl Into<String>) -> Self {
        Self::BodyNotFound(name.into())
    }

    /// Creates a protocol error.
    #[must_use]
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol(reason.into())
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(reason: impl ToString) -> Self {
        Self::StreamTransport(reason.to_string())
    }

    /// Whether the error ends the session.
    ///
    /// `BodyNotFound` and `InvalidRotation` only affect a single frame.
    #[must_use]
    pub const fn is_session_fatal(&self) -> bool {
        !matches!(self, Self::BodyNotFound(_) | Self::InvalidRotation(_))
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        Self::StreamTransport(e.to_string())
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
