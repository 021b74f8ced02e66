//! Session states and end-of-session accounting.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use courier_core::NodeId;

use crate::error::FaultClass;

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Observable lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    Negotiating,
    Exchanging,
    /// Winding down; commits already under way finish.
    Draining,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Both queues exchanged and both sides finished.
    Completed,
    /// The peer closed before both sides finished.
    PeerHalt,
    /// No frame moved in either direction within the idle timeout.
    IdleTimeout,
    /// The session ran into its duration ceiling.
    MaxDuration,
    Failed { class: FaultClass, reason: String },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => f.write_str("completed"),
            Outcome::PeerHalt => f.write_str("halted by peer"),
            Outcome::IdleTimeout => f.write_str("idle timeout"),
            Outcome::MaxDuration => f.write_str("duration limit"),
            Outcome::Failed { class, reason } => write!(f, "failed ({class:?}): {reason}"),
        }
    }
}

/// Accounting for one session, produced whatever the outcome.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// `None` when the handshake never identified the peer.
    pub peer: Option<NodeId>,
    pub role: Role,
    pub started_at: SystemTime,
    pub duration: Duration,
    /// Payload bytes written into the local receive queue.
    pub rx_bytes: u64,
    /// Payload bytes sent from the local transmit queue.
    pub tx_bytes: u64,
    /// Packets committed locally.
    pub rx_packets: u64,
    /// Local packets the peer confirmed and that were consumed.
    pub tx_packets: u64,
    pub outcome: Outcome,
}

impl SessionReport {
    /// Receive throughput in bytes per second.
    pub fn rx_rate(&self) -> f64 {
        per_sec(self.rx_bytes, self.duration)
    }

    /// Transmit throughput in bytes per second.
    pub fn tx_rate(&self) -> f64 {
        per_sec(self.tx_bytes, self.duration)
    }

    pub fn is_success(&self) -> bool {
        !self.outcome.is_failure()
    }
}

fn per_sec(bytes: u64, duration: Duration) -> f64 {
    let secs = duration.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / secs
    } else {
        0.0
    }
}

/// Counters shared by the tasks of one session.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    rx_bytes: AtomicU64,
    tx_bytes: AtomicU64,
    rx_packets: AtomicU64,
    tx_packets: AtomicU64,
}

impl Counters {
    pub fn add_rx_bytes(&self, n: u64) {
        self.rx_bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_tx_bytes(&self, n: u64) {
        self.tx_bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_rx_packet(&self) {
        self.rx_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tx_packet(&self) {
        self.tx_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.rx_bytes.load(Ordering::Relaxed),
            self.tx_bytes.load(Ordering::Relaxed),
            self.rx_packets.load(Ordering::Relaxed),
            self.tx_packets.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(rx_bytes: u64, duration: Duration) -> SessionReport {
        SessionReport {
            peer: None,
            role: Role::Initiator,
            started_at: SystemTime::now(),
            duration,
            rx_bytes,
            tx_bytes: 0,
            rx_packets: 0,
            tx_packets: 0,
            outcome: Outcome::Completed,
        }
    }

    #[test]
    fn test_rates() {
        let r = report(4096, Duration::from_secs(2));
        assert_eq!(r.rx_rate(), 2048.0);
        assert_eq!(r.tx_rate(), 0.0);
        assert_eq!(report(100, Duration::ZERO).rx_rate(), 0.0);
    }

    #[test]
    fn test_failure_is_not_success() {
        let mut r = report(0, Duration::ZERO);
        assert!(r.is_success());
        r.outcome = Outcome::Failed {
            class: FaultClass::Transport,
            reason: "peer closed the connection".into(),
        };
        assert!(!r.is_success());
        assert!(r.outcome.to_string().starts_with("failed (Transport)"));
    }

    #[test]
    fn test_counters() {
        let c = Counters::default();
        c.add_rx_bytes(10);
        c.add_rx_bytes(5);
        c.add_tx_packet();
        assert_eq!(c.snapshot(), (15, 0, 0, 1));
    }
}
