//! Clear-text header of an encrypted packet.
//!
//! ```text
//! magic(8) || nice(1) || sender(32) || recipient(32) || ephemeral(32) || signature(64)
//! ```
//!
//! Everything before the signature is signed by the sender. The header is
//! readable without any key so relays can route and prioritise.

use std::io::Read;

use courier_core::packet::magic;
use courier_core::{
    check_magic, ExchangePublicKey, MagicFamily, Niceness, NodeId, MAGIC_LEN,
};

use crate::error::Result;

/// Bytes covered by the signature.
pub const SIGNED_LEN: usize = MAGIC_LEN + 1 + 32 + 32 + 32;

/// Size of the clear-text header.
pub const PKT_ENC_OVERHEAD: usize = SIGNED_LEN + 64;

/// Parsed clear-text header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PktEncHeader {
    pub nice: Niceness,
    pub sender: NodeId,
    pub recipient: NodeId,
    pub ephemeral: ExchangePublicKey,
    pub signature: [u8; 64],
}

impl PktEncHeader {
    /// The signed prefix.
    pub fn signed_bytes(&self) -> [u8; SIGNED_LEN] {
        let mut buf = [0u8; SIGNED_LEN];
        buf[..MAGIC_LEN].copy_from_slice(&magic::PKT_ENC_V3);
        buf[MAGIC_LEN] = self.nice.0;
        buf[MAGIC_LEN + 1..MAGIC_LEN + 33].copy_from_slice(self.sender.as_bytes());
        buf[MAGIC_LEN + 33..MAGIC_LEN + 65].copy_from_slice(self.recipient.as_bytes());
        buf[MAGIC_LEN + 65..].copy_from_slice(self.ephemeral.as_bytes());
        buf
    }

    /// Full encoded header.
    pub fn to_bytes(&self) -> [u8; PKT_ENC_OVERHEAD] {
        let mut buf = [0u8; PKT_ENC_OVERHEAD];
        buf[..SIGNED_LEN].copy_from_slice(&self.signed_bytes());
        buf[SIGNED_LEN..].copy_from_slice(&self.signature);
        buf
    }

    /// Read and validate the magic, leaving `r` at the first chunk.
    pub fn read_from<R: Read>(mut r: R) -> Result<Self> {
        let mut buf = [0u8; PKT_ENC_OVERHEAD];
        r.read_exact(&mut buf[..MAGIC_LEN])
            .map_err(courier_core::CoreError::from)?;
        let mut found = [0u8; MAGIC_LEN];
        found.copy_from_slice(&buf[..MAGIC_LEN]);
        check_magic(&found, MagicFamily::PktEnc)?;

        r.read_exact(&mut buf[MAGIC_LEN..])
            .map_err(courier_core::CoreError::from)?;
        Ok(Self::decode(&buf))
    }

    /// Parse from a buffer holding at least a full header.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Self::read_from(bytes)
    }

    fn decode(buf: &[u8; PKT_ENC_OVERHEAD]) -> Self {
        let field = |at: usize| {
            let mut out = [0u8; 32];
            out.copy_from_slice(&buf[at..at + 32]);
            out
        };
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&buf[SIGNED_LEN..]);
        Self {
            nice: Niceness(buf[MAGIC_LEN]),
            sender: NodeId(field(MAGIC_LEN + 1)),
            recipient: NodeId(field(MAGIC_LEN + 33)),
            ephemeral: ExchangePublicKey(field(MAGIC_LEN + 65)),
            signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnvelopeError;

    fn sample() -> PktEncHeader {
        PktEncHeader {
            nice: Niceness::BULK,
            sender: NodeId([1; 32]),
            recipient: NodeId([2; 32]),
            ephemeral: ExchangePublicKey([3; 32]),
            signature: [4; 64],
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = sample().to_bytes();
        assert_eq!(bytes.len(), 169);
        assert_eq!(&bytes[..8], &magic::PKT_ENC_V3);
        assert_eq!(bytes[8], 128);
        assert_eq!(PktEncHeader::from_slice(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_retired_magic() {
        let mut bytes = sample().to_bytes();
        bytes[..8].copy_from_slice(&magic::PKT_ENC_V2);
        assert!(matches!(
            PktEncHeader::from_slice(&bytes),
            Err(EnvelopeError::ObsoleteVersion { .. })
        ));
    }

    #[test]
    fn test_short_header() {
        let bytes = sample().to_bytes();
        assert!(matches!(
            PktEncHeader::from_slice(&bytes[..100]),
            Err(EnvelopeError::Truncated)
        ));
    }
}
