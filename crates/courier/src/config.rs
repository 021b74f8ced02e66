//! Node configuration.

use courier_sync::SyncConfig;
use serde::{Deserialize, Serialize};

/// Default bound on concurrent sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 16;

/// Configuration for a [`Courier`](crate::Courier) node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// Applied to every session this node runs.
    pub sync: SyncConfig,
    /// Sessions running at once, across every listener and outgoing call.
    pub max_sessions: usize,
    /// Refuse to open packets from senders outside the neighbour table.
    pub require_known_sender: bool,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            require_known_sender: true,
        }
    }
}

impl CourierConfig {
    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    pub fn with_require_known_sender(mut self, require: bool) -> Self {
        self.require_known_sender = require;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::Niceness;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: CourierConfig =
            serde_json::from_str(r#"{"max_sessions": 2, "sync": {"tx_rate": 4}}"#).unwrap();
        assert_eq!(config.max_sessions, 2);
        assert_eq!(config.sync.tx_rate, Some(4));
        assert_eq!(config.sync.nice, Niceness::MAX);
        assert!(config.require_known_sender);
    }
}
