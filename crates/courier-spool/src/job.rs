//! Spooled packets and their on-disk states.

use std::fmt;

use courier_core::{NodeId, PacketHash};
use courier_envelope::PktEncHeader;

/// Which queue of a node a packet lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Received from the node.
    Rx,
    /// Waiting to be sent to the node.
    Tx,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Rx => "rx",
            Direction::Tx => "tx",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File name suffixes next to `<hash>`.
pub mod suffix {
    /// Being received; resumable.
    pub const PART: &str = ".part";
    /// Received with verification skipped.
    pub const NOCK: &str = ".nock";
    /// Already processed; kept so the packet is not fetched again.
    pub const SEEN: &str = ".seen";
    /// Fully received but failed verification.
    pub const BAD: &str = ".bad";
}

/// A packet at rest in the spool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub node: NodeId,
    pub direction: Direction,
    /// MTH root of the sealed packet; also its file name.
    pub hash: PacketHash,
    pub header: PktEncHeader,
    pub size: u64,
    /// False for packets accepted without verification (`.nock`).
    pub verified: bool,
}

impl Job {
    /// File name of this job inside its queue directory.
    pub fn file_name(&self) -> String {
        if self.verified {
            self.hash.to_base32()
        } else {
            format!("{}{}", self.hash, suffix::NOCK)
        }
    }
}

/// Where a packet stands in a receiving queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketState {
    Absent,
    /// A `.part` file holding this many bytes.
    Partial(u64),
    Complete,
    Unverified,
    Seen,
    Bad,
}

impl PacketState {
    /// Whether nothing more needs to be fetched.
    pub fn is_present(&self) -> bool {
        matches!(
            self,
            PacketState::Complete | PacketState::Unverified | PacketState::Seen
        )
    }
}
