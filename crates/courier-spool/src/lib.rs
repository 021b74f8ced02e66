//! # Courier Spool
//!
//! Packet queues per neighbour and direction.
//!
//! ## Key Types
//!
//! - [`Spool`] - The async trait the sync session talks to
//! - [`FsSpool`] - Directory-backed implementation
//! - [`Job`] - A spooled packet with its parsed header
//! - [`OutboundPacket`] - Temp-file-then-rename writer for new packets
//! - [`PartialPacket`] - Resumable writer for packets being received
//! - [`SpoolLock`] - Non-blocking advisory lock on one queue
//!
//! ## Commit Discipline
//!
//! A packet never appears under its final name before it is complete and,
//! unless verification was skipped, hashes to that name. Writers either
//! rename into place or leave behind at most one resumable `.part` file.

pub mod error;
pub mod fs;
pub mod job;
pub mod lock;
pub mod outbound;
pub mod partial;
pub mod traits;

pub use error::{Result, SpoolError};
pub use fs::FsSpool;
pub use job::{suffix, Direction, Job, PacketState};
pub use lock::SpoolLock;
pub use outbound::OutboundPacket;
pub use partial::{Committed, PartialPacket};
pub use traits::{PacketReader, Spool};
