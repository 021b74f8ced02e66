//! Packet-rate pacing.
//!
//! Token bucket with a capacity of one packet: the first packet starts at
//! once, each later one waits until `1 / rate` seconds after its
//! predecessor. Pacing applies to the start of a packet transfer, never to
//! the bytes inside it.

use std::time::Duration;

use tokio::time::Instant;

/// Paces packet starts in one direction.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Option<Duration>,
    next: Option<Instant>,
}

impl RateLimiter {
    /// `None` or zero means unlimited.
    pub fn new(per_sec: Option<u32>) -> Self {
        let interval = per_sec
            .filter(|&r| r > 0)
            .map(|r| Duration::from_secs_f64(1.0 / f64::from(r)));
        Self {
            interval,
            next: None,
        }
    }

    pub fn is_limited(&self) -> bool {
        self.interval.is_some()
    }

    /// Returns true and consumes the slot if a packet may start now.
    pub fn allow(&mut self) -> bool {
        let Some(interval) = self.interval else {
            return true;
        };
        let now = Instant::now();
        match self.next {
            Some(next) if now < next => false,
            _ => {
                self.next = Some(now + interval);
                true
            }
        }
    }

    /// Wait until a packet may start, then consume the slot.
    pub async fn until_ready(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        let start = match self.next {
            Some(next) if now < next => {
                tokio::time::sleep_until(next).await;
                next
            }
            _ => now,
        };
        self.next = Some(start + interval);
    }
}
