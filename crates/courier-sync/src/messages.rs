//! Sync protocol message types.
//!
//! Both sides of a session send every message kind; each direction of
//! transfer uses its own subset. Messages are CBOR-encoded and carried one
//! per encrypted frame.

use bytes::Bytes;
use courier_core::{Niceness, PacketHash};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Message size limits.
pub mod limits {
    /// Max packets listed in one `Offer`.
    pub const MAX_OFFER_BATCH: usize = 256;
}

/// One entry of the sender's queue as advertised to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferedPacket {
    pub hash: PacketHash,
    pub size: u64,
    pub nice: Niceness,
}

/// Sync protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpMessage {
    /// First message in each direction after the handshake.
    Hello {
        /// Least urgent niceness this side exchanges.
        nice: Niceness,
        /// Whether this side asks to skip verification.
        no_checksum: bool,
    },

    /// Part of the sender's queue. The last batch has `complete` set.
    Offer {
        packets: Vec<OfferedPacket>,
        complete: bool,
    },

    /// Ask for a packet from `offset` to its end.
    Request { hash: PacketHash, offset: u64 },

    /// A slice of a requested packet, at most one block long.
    Chunk {
        hash: PacketHash,
        offset: u64,
        payload: Bytes,
    },

    /// The receiver holds the packet; the sender may consume it.
    Done { hash: PacketHash },

    /// The sender cannot serve a requested packet in this session. The
    /// receiver keeps what it has and moves on.
    Unavailable { hash: PacketHash },

    /// The receiver will send no more requests.
    Finished,

    /// Close the session.
    Halt,
}

impl SpMessage {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| SyncError::Codec(e.to_string()))?;
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| SyncError::Codec(e.to_string()))
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SpMessage::Hello { .. } => "hello",
            SpMessage::Offer { .. } => "offer",
            SpMessage::Request { .. } => "request",
            SpMessage::Chunk { .. } => "chunk",
            SpMessage::Done { .. } => "done",
            SpMessage::Unavailable { .. } => "unavailable",
            SpMessage::Finished => "finished",
            SpMessage::Halt => "halt",
        }
    }
}
