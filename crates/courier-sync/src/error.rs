//! Error types for the sync protocol.

use courier_core::{CoreError, PacketHash};
use courier_spool::SpoolError;
use thiserror::Error;

/// Coarse classes of failure, used to decide what a caller does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultClass {
    /// The peer speaks a retired protocol version; retrying will not help.
    Obsolete,
    /// Handshake rejection or a failed transport authentication tag.
    Authentication,
    /// A received packet did not hash to its name.
    Integrity,
    /// I/O error, timeout or protocol violation; a fresh session may work.
    Transport,
    /// Local resources: locks, storage, pool capacity.
    Resource,
}

/// Errors that can occur during a sync session.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{what} is no longer supported: {hint}")]
    ObsoleteVersion {
        what: &'static str,
        hint: &'static str,
    },

    /// Handshake failed. Deliberately carries no detail.
    #[error("unknown or unauthenticated peer")]
    Unauthenticated,

    /// This node has no transport key.
    #[error("local node has no transport key")]
    NoTransportKey,

    /// A transport frame failed to decrypt.
    #[error("transport decryption failed: {0}")]
    Decrypt(snow::Error),

    #[error("packet {expected} hashed to {computed}")]
    Integrity {
        expected: PacketHash,
        computed: PacketHash,
    },

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("message encoding: {0}")]
    Codec(String),

    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),

    #[error("timed out {0}")]
    Timeout(&'static str),

    #[error("peer closed the connection")]
    Closed,

    #[error("session limit reached")]
    PoolFull,

    #[error("peer address cache is not initialised")]
    PeersInactive,

    #[error("spool: {0}")]
    Spool(SpoolError),

    #[error(transparent)]
    Core(CoreError),

    #[error("task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Which class of fault this is.
    pub fn class(&self) -> FaultClass {
        match self {
            SyncError::ObsoleteVersion { .. } => FaultClass::Obsolete,
            SyncError::Unauthenticated | SyncError::NoTransportKey | SyncError::Decrypt(_) => {
                FaultClass::Authentication
            }
            SyncError::Core(CoreError::UnknownNode(_) | CoreError::MissingNoiseKey(_)) => {
                FaultClass::Authentication
            }
            SyncError::Integrity { .. } => FaultClass::Integrity,
            SyncError::Protocol(_)
            | SyncError::Codec(_)
            | SyncError::FrameTooLarge(_)
            | SyncError::Timeout(_)
            | SyncError::Closed
            | SyncError::Core(_)
            | SyncError::Io(_) => FaultClass::Transport,
            SyncError::PoolFull
            | SyncError::PeersInactive
            | SyncError::Spool(_)
            | SyncError::Task(_) => FaultClass::Resource,
        }
    }
}

impl From<SpoolError> for SyncError {
    fn from(err: SpoolError) -> Self {
        match err {
            SpoolError::Integrity { expected, computed } => Self::Integrity { expected, computed },
            other => Self::Spool(other),
        }
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ObsoleteVersion { what, hint } => Self::ObsoleteVersion { what, hint },
            other => Self::Core(other),
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_classes() {
        let hash = PacketHash([1; 32]);
        assert_eq!(SyncError::Unauthenticated.class(), FaultClass::Authentication);
        assert_eq!(
            SyncError::from(SpoolError::Integrity {
                expected: hash,
                computed: hash
            })
            .class(),
            FaultClass::Integrity
        );
        assert_eq!(
            SyncError::from(SpoolError::NotFound(hash)).class(),
            FaultClass::Resource
        );
        assert_eq!(SyncError::Closed.class(), FaultClass::Transport);
        assert_eq!(
            SyncError::from(CoreError::ObsoleteVersion {
                what: "x",
                hint: "y"
            })
            .class(),
            FaultClass::Obsolete
        );
    }

    #[test]
    fn test_handshake_error_is_generic() {
        assert_eq!(
            SyncError::Unauthenticated.to_string(),
            "unknown or unauthenticated peer"
        );
    }
}
