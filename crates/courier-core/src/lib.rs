//! # Courier Core
//!
//! Pure primitives shared by every Courier crate: identifiers, node
//! identities, the plaintext packet header and the incremental tree hash.
//!
//! This crate contains no networking and no async code. The only I/O it
//! performs is reading byte sources handed to it by the caller.
//!
//! ## Key Types
//!
//! - [`NodeId`] - Identifier derived from a node's public keys
//! - [`PacketHash`] - MTH root of an encrypted packet; doubles as its spool name
//! - [`NodeIdentity`] / [`PeerNode`] - Private and public halves of a node
//! - [`Pkt`] - Plaintext packet header carried inside the envelope
//! - [`MthFat`] / [`MthSeq`] - The two tree hash modes
//!
//! ## Tree Hash
//!
//! ```rust
//! use courier_core::{MthFat, MthSeq, TreeHash};
//!
//! let data = vec![7u8; 100_000];
//!
//! let mut fat = MthFat::new();
//! fat.update(&data[..10]);
//! fat.update(&data[10..]);
//!
//! let mut seq = MthSeq::new(data.len() as u64, 0);
//! seq.update(&data);
//!
//! assert_eq!(fat.sum(), seq.sum());
//! ```

pub mod base32;
pub mod crypto;
pub mod error;
pub mod mth;
pub mod packet;
pub mod registry;
pub mod types;

pub use crypto::{
    Area, ExchangePublicKey, NodeIdentity, NoisePublicKey, PeerNode, SigningPublicKey,
};
pub use error::{CoreError, Result};
pub use mth::{MthEvent, MthEventKind, MthFat, MthSeq, TreeHash, BLOCK_SIZE};
pub use packet::{check_magic, MagicFamily, Niceness, Pkt, PktType, MAGIC_LEN, MAX_PATH_LEN};
pub use registry::{Neighbors, NodeRegistry};
pub use types::{AreaId, NodeId, PacketHash};
