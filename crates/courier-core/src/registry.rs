//! Node registry: the neighbour table consulted by the envelope and the
//! handshake.
//!
//! Relationships between nodes, spool directories and locks are kept as
//! lookups keyed by [`NodeId`]; nothing here holds a reference to a spool.

use std::collections::HashMap;

use crate::crypto::{Area, ExchangePublicKey, NoisePublicKey, PeerNode};
use crate::error::{CoreError, Result};
use crate::types::{AreaId, NodeId};

/// Read access to known nodes and areas.
pub trait NodeRegistry: Send + Sync {
    /// Look a node up by alias or by base32 id.
    fn resolve(&self, name_or_id: &str) -> Result<&PeerNode>;

    /// A neighbour by id.
    fn neighbor(&self, id: &NodeId) -> Option<&PeerNode>;

    /// An area by id.
    fn area(&self, id: &AreaId) -> Option<&Area>;

    /// The neighbour presenting this handshake key.
    fn peer_by_noise_key(&self, key: &NoisePublicKey) -> Option<&PeerNode>;

    // ─────────────────────────────────────────────────────────────────────────
    // Derived lookups
    // ─────────────────────────────────────────────────────────────────────────

    /// Exchange and transport keys of a neighbour.
    ///
    /// Fails if the node is unknown or has no transport key.
    fn neighbor_keys(&self, id: &NodeId) -> Result<(ExchangePublicKey, NoisePublicKey)> {
        let peer = self
            .neighbor(id)
            .ok_or_else(|| CoreError::UnknownNode(id.to_base32()))?;
        Ok((peer.exchange, peer.noise_key()?))
    }

    /// Whether a handshake key belongs to a configured neighbour.
    fn is_known_peer(&self, key: &NoisePublicKey) -> bool {
        self.peer_by_noise_key(key).is_some()
    }
}

/// In-memory neighbour table indexed by id, alias and transport key.
#[derive(Debug, Default)]
pub struct Neighbors {
    nodes: HashMap<NodeId, PeerNode>,
    aliases: HashMap<String, NodeId>,
    by_noise: HashMap<NoisePublicKey, NodeId>,
    areas: HashMap<AreaId, Area>,
}

impl Neighbors {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a neighbour.
    pub fn insert(&mut self, peer: PeerNode) {
        if let Some(old) = self.nodes.get(&peer.id) {
            if let Some(noise) = old.noise {
                self.by_noise.remove(&noise);
            }
        }
        if let Some(noise) = peer.noise {
            self.by_noise.insert(noise, peer.id);
        }
        self.nodes.insert(peer.id, peer);
    }

    /// Add a neighbour under a human alias.
    pub fn insert_named(&mut self, name: impl Into<String>, peer: PeerNode) {
        self.aliases.insert(name.into(), peer.id);
        self.insert(peer);
    }

    /// Builder-style [`insert_named`](Self::insert_named).
    pub fn with_named(mut self, name: impl Into<String>, peer: PeerNode) -> Self {
        self.insert_named(name, peer);
        self
    }

    /// Add an area.
    pub fn add_area(&mut self, area: Area) {
        self.areas.insert(area.id, area);
    }

    /// Forget a neighbour and its aliases.
    pub fn remove(&mut self, id: &NodeId) -> Option<PeerNode> {
        let peer = self.nodes.remove(id)?;
        if let Some(noise) = peer.noise {
            self.by_noise.remove(&noise);
        }
        self.aliases.retain(|_, aliased| aliased != id);
        Some(peer)
    }

    /// Number of neighbours.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the table has no neighbours.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over neighbours.
    pub fn iter(&self) -> impl Iterator<Item = &PeerNode> {
        self.nodes.values()
    }
}

impl NodeRegistry for Neighbors {
    fn resolve(&self, name_or_id: &str) -> Result<&PeerNode> {
        let id = match self.aliases.get(name_or_id) {
            Some(id) => *id,
            None => NodeId::from_base32(name_or_id)
                .map_err(|_| CoreError::UnknownNode(name_or_id.to_string()))?,
        };
        self.nodes
            .get(&id)
            .ok_or_else(|| CoreError::UnknownNode(name_or_id.to_string()))
    }

    fn neighbor(&self, id: &NodeId) -> Option<&PeerNode> {
        self.nodes.get(id)
    }

    fn area(&self, id: &AreaId) -> Option<&Area> {
        self.areas.get(id)
    }

    fn peer_by_noise_key(&self, key: &NoisePublicKey) -> Option<&PeerNode> {
        self.by_noise.get(key).and_then(|id| self.nodes.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::NodeIdentity;

    #[test]
    fn test_resolve_by_alias_and_id() {
        let alice = NodeIdentity::generate();
        let table = Neighbors::new().with_named("alice", alice.public().clone());

        assert_eq!(table.resolve("alice").unwrap().id, alice.id());
        assert_eq!(
            table.resolve(&alice.id().to_base32()).unwrap().id,
            alice.id()
        );
        assert!(matches!(
            table.resolve("bob"),
            Err(CoreError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_known_peer_by_noise_key() {
        let alice = NodeIdentity::generate();
        let stranger = NodeIdentity::generate();
        let mut table = Neighbors::new();
        table.insert(alice.public().clone());

        let alice_noise = alice.public().noise_key().unwrap();
        assert!(table.is_known_peer(&alice_noise));
        assert!(!table.is_known_peer(&stranger.public().noise_key().unwrap()));

        let (exchange, noise) = table.neighbor_keys(&alice.id()).unwrap();
        assert_eq!(exchange, alice.public().exchange);
        assert_eq!(noise, alice_noise);
    }

    #[test]
    fn test_neighbor_without_noise_key() {
        let offline = NodeIdentity::from_secrets([5; 32], [6; 32], None);
        let mut table = Neighbors::new();
        table.insert(offline.public().clone());

        assert!(matches!(
            table.neighbor_keys(&offline.id()),
            Err(CoreError::MissingNoiseKey(_))
        ));
    }

    #[test]
    fn test_remove_drops_indexes() {
        let alice = NodeIdentity::generate();
        let mut table = Neighbors::new().with_named("alice", alice.public().clone());
        let noise = alice.public().noise_key().unwrap();

        assert!(table.remove(&alice.id()).is_some());
        assert!(table.is_empty());
        assert!(!table.is_known_peer(&noise));
        assert!(table.resolve("alice").is_err());
    }

    #[test]
    fn test_area_lookup() {
        let area = Area::generate();
        let id = area.id;
        let mut table = Neighbors::new();
        table.add_area(area);

        assert!(table.area(&id).unwrap().is_member());
        assert!(table.area(&AreaId::from_bytes([0; 32])).is_none());
    }
}
