//! Error types for the Courier facade.

use courier_core::{CoreError, NodeId};
use courier_envelope::EnvelopeError;
use courier_spool::SpoolError;
use courier_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during Courier operations.
#[derive(Debug, Error)]
pub enum CourierError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("spool error: {0}")]
    Spool(#[from] SpoolError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// No area with this id is configured.
    #[error("unknown area: {0}")]
    UnknownArea(String),

    /// The peer address cache has nothing for this node.
    #[error("no known address for {0}")]
    NoAddress(NodeId),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Courier operations.
pub type Result<T> = std::result::Result<T, CourierError>;
