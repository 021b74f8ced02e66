//! Error types for Courier Core.

use thiserror::Error;

/// Errors raised while parsing identifiers, headers and keys.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A recognised but retired wire format.
    #[error("{what} is no longer supported: {hint}")]
    ObsoleteVersion {
        what: &'static str,
        hint: &'static str,
    },

    /// Leading bytes do not match any known magic of the expected family.
    #[error("unrecognised {family} magic: {found}")]
    UnknownMagic { family: &'static str, found: String },

    #[error("malformed packet header: {0}")]
    MalformedPacket(String),

    #[error("path of {0} bytes exceeds the 255 byte limit")]
    PathTooLong(usize),

    #[error("invalid base32: {0}")]
    InvalidBase32(String),

    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("invalid niceness: {0}")]
    InvalidNiceness(String),

    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("node {0} has no transport key")]
    MissingNoiseKey(String),

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("signature verification failed")]
    BadSignature,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
