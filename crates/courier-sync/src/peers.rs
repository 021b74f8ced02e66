//! Process-wide cache of peer addresses.
//!
//! Filled by whatever discovers peers and read by whatever dials them. The
//! cache exists between [`init`] and [`teardown`]; outside that window
//! writes fail and reads come back empty.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use courier_core::NodeId;

use crate::error::{Result, SyncError};

type Table = HashMap<NodeId, Vec<SocketAddr>>;

static PEERS: RwLock<Option<Table>> = RwLock::new(None);

fn read() -> RwLockReadGuard<'static, Option<Table>> {
    PEERS.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write() -> RwLockWriteGuard<'static, Option<Table>> {
    PEERS.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Start the cache. A second call keeps existing entries.
pub fn init() {
    write().get_or_insert_with(HashMap::new);
}

/// Drop the cache and everything in it.
pub fn teardown() {
    *write() = None;
}

pub fn is_active() -> bool {
    read().is_some()
}

/// Record an address for `node`. Duplicates are ignored.
pub fn insert(node: NodeId, addr: SocketAddr) -> Result<()> {
    let mut guard = write();
    let table = guard.as_mut().ok_or(SyncError::PeersInactive)?;
    let addrs = table.entry(node).or_default();
    if !addrs.contains(&addr) {
        addrs.push(addr);
    }
    Ok(())
}

/// Known addresses of `node`, oldest first.
pub fn lookup(node: &NodeId) -> Vec<SocketAddr> {
    read()
        .as_ref()
        .and_then(|table| table.get(node).cloned())
        .unwrap_or_default()
}

/// Forget `node`. Returns the addresses it had.
pub fn remove(node: &NodeId) -> Vec<SocketAddr> {
    write()
        .as_mut()
        .and_then(|table| table.remove(node))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test owns the global lifecycle so parallel tests cannot interleave.
    #[test]
    fn test_lifecycle() {
        let node = NodeId([7; 32]);
        let addr: SocketAddr = "192.0.2.1:5400".parse().unwrap();
        let other: SocketAddr = "[2001:db8::1]:5400".parse().unwrap();

        teardown();
        assert!(!is_active());
        assert!(matches!(insert(node, addr), Err(SyncError::PeersInactive)));
        assert!(lookup(&node).is_empty());

        init();
        assert!(is_active());
        insert(node, addr).unwrap();
        insert(node, addr).unwrap();
        insert(node, other).unwrap();
        assert_eq!(lookup(&node), vec![addr, other]);

        init();
        assert_eq!(lookup(&node).len(), 2);

        assert_eq!(remove(&node), vec![addr, other]);
        assert!(lookup(&node).is_empty());

        insert(node, addr).unwrap();
        teardown();
        assert!(lookup(&node).is_empty());
    }
}
