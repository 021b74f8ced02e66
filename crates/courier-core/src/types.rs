//! Strong identifier types.
//!
//! All identifiers are 32-byte newtypes so a node id can never be passed
//! where a packet hash is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::base32;
use crate::error::CoreError;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $debug:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Base32 text form, as used in spool paths.
            pub fn to_base32(&self) -> String {
                base32::encode(&self.0)
            }

            /// Parse the base32 text form.
            pub fn from_base32(s: &str) -> Result<Self, CoreError> {
                base32::decode_array::<32>(s).map(Self)
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($debug, "({})"), &self.to_hex()[..16])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_base32())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_base32(s)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }
    };
}

id_type!(
    /// A 32-byte node identifier.
    ///
    /// Derived by hashing the node's public keys, see
    /// [`PeerNode::new`](crate::PeerNode::new). It is the only addressing
    /// token that appears in clear-text headers and in the spool layout.
    NodeId,
    "NodeId"
);

id_type!(
    /// The MTH root of an encrypted packet.
    ///
    /// A spooled packet is stored under the base32 form of this hash, so it
    /// is both the deduplication key and the tamper-evidence check.
    PacketHash,
    "PacketHash"
);

id_type!(
    /// Identifier of an area (group recipient).
    ///
    /// Same shape as a [`NodeId`] and carried in the same header field, but
    /// resolved against the local area table instead of the neighbour table.
    AreaId,
    "AreaId"
);

impl NodeId {
    /// The all-zero id, used where a header field has no meaningful value.
    pub const ZERO: Self = Self([0u8; 32]);
}

impl From<AreaId> for NodeId {
    fn from(area: AreaId) -> Self {
        Self(area.0)
    }
}

impl From<NodeId> for AreaId {
    fn from(id: NodeId) -> Self {
        Self(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_base32_roundtrip() {
        let id = NodeId::from_bytes([0x42; 32]);
        let text = id.to_base32();
        assert_eq!(text.len(), 52);
        assert_eq!(text.parse::<NodeId>().unwrap(), id);
    }

    #[test]
    fn test_packet_hash_display_is_base32() {
        let hash = PacketHash::from_bytes([0u8; 32]);
        assert_eq!(format!("{}", hash), "A".repeat(52));
    }

    #[test]
    fn test_debug_is_short_hex() {
        let id = NodeId::from_bytes([0xcd; 32]);
        assert_eq!(format!("{:?}", id), "NodeId(cdcdcdcdcdcdcdcd)");
    }

    #[test]
    fn test_area_id_converts_to_node_id() {
        let area = AreaId::from_bytes([7; 32]);
        let as_node: NodeId = area.into();
        assert_eq!(as_node.as_bytes(), area.as_bytes());
    }
}
