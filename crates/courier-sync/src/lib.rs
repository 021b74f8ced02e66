//! # Courier Sync
//!
//! The online sync protocol (SP): two neighbours authenticate each other,
//! agree on what to exchange, and move spooled packets in both directions
//! over one connection, resuming partial transfers where they stopped.
//!
//! ## Key Types
//!
//! - [`Session`] - One session over any duplex [`Transport`]
//! - [`SessionReport`] - Bytes, packets, duration and outcome of a session
//! - [`SyncConfig`] - Niceness ceiling, allow-list, rates and deadlines
//! - [`SessionPool`] - Bound on concurrent sessions
//! - [`SpMessage`] - Wire messages
//!
//! ## Wire Format
//!
//! ```text
//! handshake frame:  u32 BE len ‖ Sp magic ‖ Noise IK message
//! transport frame:  u32 BE len ‖ Noise ciphertext of one CBOR SpMessage
//! ```
//!
//! Both directions progress concurrently; bulk chunks never delay control
//! messages.

pub mod config;
pub mod error;
pub mod framing;
pub mod handshake;
pub mod messages;
pub mod peers;
pub mod pool;
pub mod rate;
pub mod session;
pub mod transport;

pub use config::SyncConfig;
pub use error::{FaultClass, Result, SyncError};
pub use handshake::NOISE_PATTERN;
pub use messages::{OfferedPacket, SpMessage};
pub use pool::{SessionPermit, SessionPool};
pub use rate::RateLimiter;
pub use session::{Outcome, Role, Session, SessionContext, SessionReport, SessionState};
pub use transport::{memory_pair, Transport};
