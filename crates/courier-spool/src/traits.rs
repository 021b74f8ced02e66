//! Spool trait: the storage interface the sync session consumes.

use async_trait::async_trait;
use courier_core::{NodeId, PacketHash};
use tokio::io::AsyncRead;

use crate::error::Result;
use crate::job::{Direction, Job, PacketState};
use crate::lock::SpoolLock;
use crate::outbound::OutboundPacket;
use crate::partial::PartialPacket;

/// Byte stream of a spooled packet.
pub type PacketReader = Box<dyn AsyncRead + Send + Unpin>;

/// Per-node, per-direction packet queues.
///
/// Nodes are addressed only by id; an implementation maps ids to storage.
#[async_trait]
pub trait Spool: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Queues
    // ─────────────────────────────────────────────────────────────────────────

    /// Packets in a queue, in no particular order.
    ///
    /// Files whose header cannot be parsed are skipped with a warning.
    async fn jobs(&self, node: &NodeId, direction: Direction) -> Result<Vec<Job>>;

    /// Read a packet starting `offset` bytes in.
    async fn open_read(&self, job: &Job, offset: u64) -> Result<PacketReader>;

    /// Delete a packet, e.g. after the peer confirmed receipt.
    async fn remove(&self, job: &Job) -> Result<()>;

    /// Replace a processed packet with a `.seen` marker.
    async fn mark_seen(&self, job: &Job) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Receiving
    // ─────────────────────────────────────────────────────────────────────────

    /// State of a packet in the receive queue of `node`.
    async fn packet_state(&self, node: &NodeId, hash: &PacketHash) -> Result<PacketState>;

    /// Open or resume a partial packet in the receive queue of `node`.
    async fn create_resumable(
        &self,
        node: &NodeId,
        hash: &PacketHash,
        size: u64,
    ) -> Result<PartialPacket>;

    // ─────────────────────────────────────────────────────────────────────────
    // Sending and locking
    // ─────────────────────────────────────────────────────────────────────────

    /// Start writing a packet into the transmit queue of `node`.
    fn create_outbound(&self, node: &NodeId) -> Result<OutboundPacket>;

    /// Take the advisory lock of one queue without waiting.
    fn lock(&self, node: &NodeId, direction: Direction) -> Result<SpoolLock>;
}
