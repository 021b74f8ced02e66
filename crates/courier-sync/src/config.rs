//! Session configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use courier_core::{Niceness, PacketHash};
use serde::{Deserialize, Serialize};

/// Default time allowed for the two handshake messages.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default inactivity window before a session drains.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
/// Default number of bulk chunks queued per direction.
pub const DEFAULT_CHANNEL_DEPTH: usize = 8;

/// What a session offers and accepts, and how long it may run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Least urgent niceness exchanged. The peer's ceiling also applies.
    pub nice: Niceness,
    /// When set, only these packets are offered or requested.
    pub allow_list: Option<BTreeSet<PacketHash>>,
    /// Ask to skip MTH verification of received packets.
    pub no_checksum: bool,
    /// Packets per second this side starts receiving. `None` is unlimited.
    pub rx_rate: Option<u32>,
    /// Packets per second this side starts sending. `None` is unlimited.
    pub tx_rate: Option<u32>,
    #[serde(with = "secs")]
    pub handshake_timeout: Duration,
    /// Session drains after this long without a frame from the peer.
    #[serde(with = "secs")]
    pub idle_timeout: Duration,
    /// Session drains after running this long.
    #[serde(with = "opt_secs")]
    pub max_duration: Option<Duration>,
    pub channel_depth: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            nice: Niceness::MAX,
            allow_list: None,
            no_checksum: false,
            rx_rate: None,
            tx_rate: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_duration: None,
            channel_depth: DEFAULT_CHANNEL_DEPTH,
        }
    }
}

impl SyncConfig {
    pub fn with_nice(mut self, nice: Niceness) -> Self {
        self.nice = nice;
        self
    }

    pub fn with_allow_list(mut self, hashes: impl IntoIterator<Item = PacketHash>) -> Self {
        self.allow_list = Some(hashes.into_iter().collect());
        self
    }

    pub fn with_no_checksum(mut self, no_checksum: bool) -> Self {
        self.no_checksum = no_checksum;
        self
    }

    pub fn with_rx_rate(mut self, per_sec: u32) -> Self {
        self.rx_rate = Some(per_sec);
        self
    }

    pub fn with_tx_rate(mut self, per_sec: u32) -> Self {
        self.tx_rate = Some(per_sec);
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }

    pub fn with_channel_depth(mut self, depth: usize) -> Self {
        self.channel_depth = depth.max(1);
        self
    }

    /// Whether a packet passes the niceness ceiling and allow-list.
    pub fn admits(&self, ceiling: Niceness, hash: &PacketHash, nice: Niceness) -> bool {
        nice <= ceiling
            && self
                .allow_list
                .as_ref()
                .map_or(true, |allowed| allowed.contains(hash))
    }
}

mod secs {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(D::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.nice, Niceness::MAX);
        assert!(config.allow_list.is_none());
        assert!(config.max_duration.is_none());
    }

    #[test]
    fn test_admits() {
        let a = PacketHash([1; 32]);
        let b = PacketHash([2; 32]);
        let config = SyncConfig::default();
        assert!(config.admits(Niceness::NORMAL, &a, Niceness::FLASH));
        assert!(config.admits(Niceness::NORMAL, &a, Niceness::NORMAL));
        assert!(!config.admits(Niceness::NORMAL, &a, Niceness::BULK));

        let config = config.with_allow_list([a]);
        assert!(config.admits(Niceness::MAX, &a, Niceness::BULK));
        assert!(!config.admits(Niceness::MAX, &b, Niceness::FLASH));
    }

    #[test]
    fn test_serde_durations_as_seconds() {
        let config = SyncConfig::default()
            .with_idle_timeout(Duration::from_millis(1500))
            .with_max_duration(Duration::from_secs(600))
            .with_tx_rate(4);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["idle_timeout"], 1.5);
        assert_eq!(json["max_duration"], 600.0);

        let back: SyncConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_serde_missing_fields_default() {
        let config: SyncConfig = serde_json::from_str(r#"{"no_checksum": true}"#).unwrap();
        assert!(config.no_checksum);
        assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
    }
}
