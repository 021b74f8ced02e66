//! Error types for the spool.

use courier_core::{NodeId, PacketHash};
use courier_envelope::EnvelopeError;
use thiserror::Error;

use crate::job::Direction;

/// Errors that can occur during spool operations.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// Another process or session holds the lock.
    #[error("{direction} spool of {node} is locked")]
    Locked { node: NodeId, direction: Direction },

    /// A fully received packet does not hash to its name.
    #[error("packet {expected} hashed to {computed}; kept as .bad")]
    Integrity {
        expected: PacketHash,
        computed: PacketHash,
    },

    /// Commit requested before all bytes arrived.
    #[error("packet {hash} has {have} of {size} bytes")]
    Incomplete {
        hash: PacketHash,
        have: u64,
        size: u64,
    },

    /// A write did not continue where the partial file ends.
    #[error("write at offset {got}, partial file ends at {expected}")]
    OutOfOrder { expected: u64, got: u64 },

    /// A write would take the packet past its announced size.
    #[error("write past the announced size of {size} bytes")]
    Overflow { size: u64 },

    #[error("packet not found: {0}")]
    NotFound(PacketHash),

    /// Spooled file with an unreadable header.
    #[error("invalid packet header: {0}")]
    Header(#[from] EnvelopeError),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;
