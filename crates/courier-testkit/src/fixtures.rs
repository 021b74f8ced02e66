//! Test fixtures and helpers.
//!
//! Common setup code for session and integration tests.

use std::sync::Arc;

use courier_core::{Area, AreaId, Neighbors, Niceness, NodeId, NodeIdentity, PacketHash, Pkt, PktType};
use courier_envelope::seal_packet;
use courier_spool::{FsSpool, Spool};
use courier_sync::{SessionContext, SyncConfig};
use tempfile::TempDir;

/// A node with a spool in its own temporary directory.
pub struct TestNode {
    pub identity: Arc<NodeIdentity>,
    pub neighbors: Arc<Neighbors>,
    pub spool: Arc<FsSpool>,
    dir: TempDir,
}

impl TestNode {
    /// A node with no neighbours.
    pub fn new() -> Self {
        Self::with_identity(NodeIdentity::generate(), Neighbors::new())
    }

    fn with_identity(identity: NodeIdentity, neighbors: Neighbors) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let spool = FsSpool::open(dir.path()).expect("open spool");
        Self {
            identity: Arc::new(identity),
            neighbors: Arc::new(neighbors),
            spool: Arc::new(spool),
            dir,
        }
    }

    /// Two nodes, each in the other's neighbour table as "alice" and "bob".
    pub fn pair() -> (Self, Self) {
        let alice = NodeIdentity::generate();
        let bob = NodeIdentity::generate();
        let alice_knows = Neighbors::new().with_named("bob", bob.public().clone());
        let bob_knows = Neighbors::new().with_named("alice", alice.public().clone());
        (
            Self::with_identity(alice, alice_knows),
            Self::with_identity(bob, bob_knows),
        )
    }

    /// Like [`pair`](Self::pair), with both nodes members of one area.
    pub fn pair_in_area(secret: [u8; 32]) -> (Self, Self, AreaId) {
        let alice = NodeIdentity::generate();
        let bob = NodeIdentity::generate();
        let mut alice_knows = Neighbors::new().with_named("bob", bob.public().clone());
        let mut bob_knows = Neighbors::new().with_named("alice", alice.public().clone());
        let area = Area::from_secret(secret);
        let id = area.id;
        alice_knows.add_area(area);
        bob_knows.add_area(Area::from_secret(secret));
        (
            Self::with_identity(alice, alice_knows),
            Self::with_identity(bob, bob_knows),
            id,
        )
    }

    pub fn id(&self) -> NodeId {
        self.identity.id()
    }

    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Session context over this node's keys, neighbours and spool.
    pub fn context(&self, config: SyncConfig) -> SessionContext {
        SessionContext {
            identity: self.identity.clone(),
            registry: self.neighbors.clone(),
            spool: self.spool.clone(),
            config,
        }
    }

    /// Seal `payload` to `to` and queue it. Returns the packet hash.
    pub fn enqueue(&self, to: &TestNode, nice: Niceness, payload: &[u8]) -> PacketHash {
        let pkt = Pkt::new(PktType::File, nice, "payload.bin").expect("valid header");
        let mut out = self.spool.create_outbound(&to.id()).expect("create outbound");
        seal_packet(
            &self.identity,
            to.identity.public().into(),
            &pkt,
            payload,
            &mut out,
        )
        .expect("seal");
        out.commit().expect("commit").0
    }
}

impl Default for TestNode {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic payload of `len` bytes, distinct per `seed`.
pub fn payload(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::NodeRegistry;
    use courier_spool::{Direction, Spool};

    #[test]
    fn test_pair_are_mutual_neighbours() {
        let (alice, bob) = TestNode::pair();
        assert_eq!(alice.neighbors.resolve("bob").unwrap().id, bob.id());
        assert_eq!(bob.neighbors.resolve("alice").unwrap().id, alice.id());
        assert!(alice
            .neighbors
            .is_known_peer(&bob.identity.public().noise_key().unwrap()));
    }

    #[tokio::test]
    async fn test_enqueue_lands_in_tx() {
        let (alice, bob) = TestNode::pair();
        let hash = alice.enqueue(&bob, Niceness::BULK, &payload(1, 10));
        let jobs = alice.spool.jobs(&bob.id(), Direction::Tx).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].hash, hash);
        assert_eq!(jobs[0].header.nice, Niceness::BULK);
    }

    #[test]
    fn test_payload_is_deterministic() {
        assert_eq!(payload(3, 100), payload(3, 100));
        assert_ne!(payload(3, 100), payload(4, 100));
    }
}
