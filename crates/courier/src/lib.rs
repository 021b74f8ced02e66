//! # Courier
//!
//! Store-and-forward packet exchange between nodes that know each other's
//! keys. Packets are sealed to a recipient, spooled per neighbour, and moved
//! whenever two neighbours hold a sync session.
//!
//! ## Overview
//!
//! - **Packets**: a plaintext header (`Pkt`) and payload sealed into an
//!   encrypted envelope addressed to a node or an area
//! - **Spool**: per-neighbour receive and transmit queues on disk, named by
//!   the MTH root of each sealed packet
//! - **Sessions**: Noise-authenticated exchanges that resume interrupted
//!   transfers and verify every packet before it becomes visible
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use courier::core::{Neighbors, NodeIdentity, Niceness, Pkt, PktType};
//! use courier::spool::FsSpool;
//! use courier::{Courier, CourierConfig};
//!
//! async fn example(bob: courier::core::PeerNode) -> courier::Result<()> {
//!     let neighbors = Neighbors::new().with_named("bob", bob.clone());
//!     let node = Courier::new(
//!         Arc::new(NodeIdentity::generate()),
//!         Arc::new(neighbors),
//!         Arc::new(FsSpool::open("/var/spool/courier")?),
//!         CourierConfig::default(),
//!     );
//!
//!     let pkt = Pkt::new(PktType::File, Niceness::NORMAL, "notes.txt")?;
//!     node.enqueue("bob", pkt, &b"hello"[..]).await?;
//!
//!     let stream = tokio::net::TcpStream::connect("192.0.2.7:5400").await?;
//!     let report = node.call(&bob.id, stream).await?;
//!     println!("{}: {} packets out", report.outcome, report.tx_packets);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `courier::core` - identifiers, keys, registry, packet header, MTH
//! - `courier::envelope` - sealing and opening packets
//! - `courier::spool` - queues on disk
//! - `courier::sync` - the session protocol

pub mod config;
pub mod error;
pub mod node;

pub use courier_core as core;
pub use courier_envelope as envelope;
pub use courier_spool as spool;
pub use courier_sync as sync;

pub use config::CourierConfig;
pub use error::{CourierError, Result};
pub use node::{Courier, Enqueued};

pub use courier_core::{AreaId, NodeId, Niceness, PacketHash, Pkt, PktType};
pub use courier_sync::{Outcome, SessionReport, SyncConfig};
