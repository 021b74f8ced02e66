//! # Courier Envelope
//!
//! End-to-end encryption of packets between nodes.
//!
//! A sealed packet (PktEnc) is a clear-text header naming sender and
//! recipient followed by independently authenticated chunks. Each packet
//! uses a fresh ephemeral key, and corruption is caught at the chunk where
//! it happens, while streaming.
//!
//! ## Usage
//!
//! ```rust
//! use courier_core::{Neighbors, Niceness, NodeIdentity};
//! use courier_envelope::{open_to_vec, seal, OpenOptions};
//!
//! let alice = NodeIdentity::generate();
//! let bob = NodeIdentity::generate();
//! let mut bobs_neighbors = Neighbors::new();
//! bobs_neighbors.insert(alice.public().clone());
//!
//! let mut sealed = Vec::new();
//! seal(&alice, bob.public().into(), Niceness::NORMAL, &b"hello"[..], &mut sealed).unwrap();
//!
//! let options = OpenOptions { require_known_sender: true };
//! let (opened, plaintext) = open_to_vec(&bob, &bobs_neighbors, options, &sealed[..]).unwrap();
//! assert_eq!(opened.header.sender, alice.id());
//! assert_eq!(plaintext, b"hello");
//! ```

pub mod error;
pub mod header;
pub mod stream;

pub use error::{EnvelopeError, Result};
pub use header::{PktEncHeader, PKT_ENC_OVERHEAD};
pub use stream::{
    open, open_to_vec, seal, seal_packet, sealed_len, OpenOptions, Opened, Recipient, TAG_LEN,
};
