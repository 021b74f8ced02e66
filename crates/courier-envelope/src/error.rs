//! Error types for the envelope.

use courier_core::{CoreError, NodeId};
use thiserror::Error;

/// Errors raised while sealing or opening a packet.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// A retired encrypted packet format.
    #[error("{what} is no longer supported: {hint}")]
    ObsoleteVersion {
        what: &'static str,
        hint: &'static str,
    },

    /// The sender is not a neighbour and known senders are required.
    #[error("packet from unknown sender {0}")]
    UnknownSender(NodeId),

    /// The header signature does not match the sender's signing key.
    #[error("header signature does not verify")]
    BadSignature,

    /// A ciphertext chunk failed authentication.
    #[error("chunk {chunk} failed authentication")]
    Authentication { chunk: u64 },

    /// Neither this node nor any held area matches the recipient.
    #[error("packet is addressed to {0}, which this node cannot open")]
    WrongRecipient(NodeId),

    /// The stream ended before the final chunk.
    #[error("encrypted packet is truncated")]
    Truncated,

    /// Bytes follow the final chunk.
    #[error("data after the final chunk")]
    TrailingData,

    #[error("cipher failure")]
    Cipher,

    #[error(transparent)]
    Core(CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for EnvelopeError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ObsoleteVersion { what, hint } => Self::ObsoleteVersion { what, hint },
            CoreError::BadSignature | CoreError::InvalidPublicKey => Self::BadSignature,
            CoreError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Self::Truncated,
            CoreError::Io(e) => Self::Io(e),
            other => Self::Core(other),
        }
    }
}

/// Result type for envelope operations.
pub type Result<T> = std::result::Result<T, EnvelopeError>;
