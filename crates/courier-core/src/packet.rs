//! Plaintext packet header and wire magics.
//!
//! Every Courier structure starts with an 8-byte magic: a 5-byte family tag
//! followed by a 3-byte version. Retired versions stay listed so that they
//! are rejected with a specific message instead of a generic parse error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Length of every magic.
pub const MAGIC_LEN: usize = 8;

/// Longest path/handle field in a [`Pkt`].
pub const MAX_PATH_LEN: usize = 255;

/// Current and retired magics.
pub mod magic {
    /// Plaintext packet header, current.
    pub const PKT_V3: [u8; 8] = *b"CRRPL\x00\x00\x03";
    pub const PKT_V2: [u8; 8] = *b"CRRPL\x00\x00\x02";
    pub const PKT_V1: [u8; 8] = *b"CRRPL\x00\x00\x01";

    /// Encrypted packet, current.
    pub const PKT_ENC_V3: [u8; 8] = *b"CRRPE\x00\x00\x03";
    pub const PKT_ENC_V2: [u8; 8] = *b"CRRPE\x00\x00\x02";
    pub const PKT_ENC_V1: [u8; 8] = *b"CRRPE\x00\x00\x01";

    /// Sync protocol handshake, current.
    pub const SP_V1: [u8; 8] = *b"CRRSP\x00\x00\x01";
    pub const SP_V0: [u8; 8] = *b"CRRSP\x00\x00\x00";
}

/// Which structure a magic introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicFamily {
    Pkt,
    PktEnc,
    Sp,
}

impl MagicFamily {
    fn name(self) -> &'static str {
        match self {
            MagicFamily::Pkt => "packet",
            MagicFamily::PktEnc => "encrypted packet",
            MagicFamily::Sp => "sync protocol",
        }
    }

    fn current(self) -> [u8; 8] {
        match self {
            MagicFamily::Pkt => magic::PKT_V3,
            MagicFamily::PktEnc => magic::PKT_ENC_V3,
            MagicFamily::Sp => magic::SP_V1,
        }
    }
}

struct Retired {
    magic: [u8; 8],
    family: MagicFamily,
    what: &'static str,
    hint: &'static str,
}

const RETIRED: &[Retired] = &[
    Retired {
        magic: magic::PKT_V1,
        family: MagicFamily::Pkt,
        what: "packet format v1",
        hint: "the sender runs a release older than 0.3; ask them to upgrade",
    },
    Retired {
        magic: magic::PKT_V2,
        family: MagicFamily::Pkt,
        what: "packet format v2",
        hint: "v2 lacked the area payload type; ask the sender to upgrade",
    },
    Retired {
        magic: magic::PKT_ENC_V1,
        family: MagicFamily::PktEnc,
        what: "encrypted packet format v1",
        hint: "v1 sealed the whole payload as one block; re-send with a current release",
    },
    Retired {
        magic: magic::PKT_ENC_V2,
        family: MagicFamily::PktEnc,
        what: "encrypted packet format v2",
        hint: "v2 chunks were not bound to the header; re-send with a current release",
    },
    Retired {
        magic: magic::SP_V0,
        family: MagicFamily::Sp,
        what: "sync protocol v0",
        hint: "the peer uses the pre-Noise handshake; upgrade the peer",
    },
];

/// Check that `found` is the current magic of `family`.
///
/// Retired magics map to [`CoreError::ObsoleteVersion`]; anything else is
/// [`CoreError::UnknownMagic`].
pub fn check_magic(found: &[u8; MAGIC_LEN], family: MagicFamily) -> Result<()> {
    if *found == family.current() {
        return Ok(());
    }
    if let Some(retired) = RETIRED
        .iter()
        .find(|r| r.family == family && r.magic == *found)
    {
        return Err(CoreError::ObsoleteVersion {
            what: retired.what,
            hint: retired.hint,
        });
    }
    Err(CoreError::UnknownMagic {
        family: family.name(),
        found: hex::encode(found),
    })
}

/// Inverse priority of a packet: 0 is most eager, 255 least.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Niceness(pub u8);

impl Niceness {
    pub const FLASH: Self = Self(32);
    pub const PRIORITY: Self = Self(64);
    pub const NORMAL: Self = Self(96);
    pub const BULK: Self = Self(128);
    pub const MAX: Self = Self(255);

    const LEVELS: [(&'static str, Niceness); 4] = [
        ("flash", Self::FLASH),
        ("priority", Self::PRIORITY),
        ("normal", Self::NORMAL),
        ("bulk", Self::BULK),
    ];
}

impl Default for Niceness {
    fn default() -> Self {
        Self::NORMAL
    }
}

/// Accepts a number (`"100"`), a level name (`"bulk"`), or a level with an
/// offset of up to 31 (`"normal+4"`, `"P-2"`). Level names may be abbreviated
/// to their first letter; `"max"` is 255.
impl FromStr for Niceness {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim().to_ascii_lowercase();
        if let Ok(n) = text.parse::<u8>() {
            return Ok(Self(n));
        }
        if text == "max" {
            return Ok(Self::MAX);
        }

        let split = text.find(['+', '-']).unwrap_or(text.len());
        let (name, delta) = text.split_at(split);
        let base = Self::LEVELS
            .iter()
            .find(|(level, _)| *level == name || (name.len() == 1 && level.starts_with(name)))
            .map(|(_, nice)| nice.0 as i16)
            .ok_or_else(|| CoreError::InvalidNiceness(s.to_string()))?;

        let offset = if delta.is_empty() {
            0
        } else {
            let magnitude: i16 = delta[1..]
                .parse()
                .map_err(|_| CoreError::InvalidNiceness(s.to_string()))?;
            if magnitude > 31 {
                return Err(CoreError::InvalidNiceness(s.to_string()));
            }
            if delta.starts_with('-') {
                -magnitude
            } else {
                magnitude
            }
        };
        Ok(Self((base + offset) as u8))
    }
}

impl fmt::Display for Niceness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::MAX {
            return f.write_str("max");
        }
        let closest = Self::LEVELS
            .iter()
            .map(|(name, level)| (*name, self.0 as i16 - level.0 as i16))
            .min_by_key(|(_, diff)| diff.abs());
        match closest {
            Some((name, 0)) => f.write_str(name),
            Some((name, diff)) if (-31..=31).contains(&diff) => write!(f, "{}{:+}", name, diff),
            _ => write!(f, "{}", self.0),
        }
    }
}

/// Payload type of a plaintext packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PktType {
    /// A file to save; path is the destination name.
    File = 0,
    /// A request for the recipient to send a file back; path is the source.
    FileRequest = 1,
    /// A command to run with compressed stdin; path is the handle.
    Exec = 2,
    /// A packet to forward; path is the next-hop node id.
    Transitional = 3,
    /// A command to run with uncompressed stdin.
    ExecUncompressed = 4,
    /// A packet for an area; path is the area id.
    Area = 5,
    /// Acknowledgement of delivery; path is the acknowledged packet hash.
    Ack = 6,
}

impl PktType {
    fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => PktType::File,
            1 => PktType::FileRequest,
            2 => PktType::Exec,
            3 => PktType::Transitional,
            4 => PktType::ExecUncompressed,
            5 => PktType::Area,
            6 => PktType::Ack,
            other => {
                return Err(CoreError::MalformedPacket(format!(
                    "unknown packet type {}",
                    other
                )))
            }
        })
    }
}

/// The plaintext header at the start of every sealed payload.
///
/// Wire layout: `magic(8) || type(1) || nice(1) || path_len(1) || path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkt {
    pub kind: PktType,
    pub nice: Niceness,
    pub path: Vec<u8>,
}

impl Pkt {
    /// Build a header, checking the path limit.
    pub fn new(kind: PktType, nice: Niceness, path: impl Into<Vec<u8>>) -> Result<Self> {
        let path = path.into();
        if path.len() > MAX_PATH_LEN {
            return Err(CoreError::PathTooLong(path.len()));
        }
        Ok(Self { kind, nice, path })
    }

    /// Encoded length of this header.
    pub fn encoded_len(&self) -> usize {
        MAGIC_LEN + 3 + self.path.len()
    }

    /// Encode to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&magic::PKT_V3);
        buf.push(self.kind as u8);
        buf.push(self.nice.0);
        buf.push(self.path.len() as u8);
        buf.extend_from_slice(&self.path);
        buf
    }

    /// Write the encoded header.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Read and validate a header, leaving `r` positioned at the payload.
    pub fn read_from<R: Read>(mut r: R) -> Result<Self> {
        let mut magic = [0u8; MAGIC_LEN];
        r.read_exact(&mut magic)?;
        check_magic(&magic, MagicFamily::Pkt)?;

        let mut fixed = [0u8; 3];
        r.read_exact(&mut fixed)?;
        let kind = PktType::from_u8(fixed[0])?;
        let mut path = vec![0u8; fixed[2] as usize];
        r.read_exact(&mut path)?;

        Ok(Self {
            kind,
            nice: Niceness(fixed[1]),
            path,
        })
    }

    /// Parse a header from the front of a byte slice, returning the rest.
    pub fn split_from(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let mut cursor = bytes;
        let pkt = Self::read_from(&mut cursor)
            .map_err(|e| match e {
                CoreError::Io(_) => CoreError::MalformedPacket("truncated header".into()),
                other => other,
            })?;
        Ok((pkt, cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkt_roundtrip() {
        let pkt = Pkt::new(PktType::File, Niceness::BULK, b"photos/cat.jpg".to_vec()).unwrap();
        let mut bytes = pkt.to_bytes();
        bytes.extend_from_slice(b"payload");

        let (parsed, rest) = Pkt::split_from(&bytes).unwrap();
        assert_eq!(parsed, pkt);
        assert_eq!(rest, b"payload");
    }

    #[test]
    fn test_path_too_long() {
        assert!(Pkt::new(PktType::File, Niceness::NORMAL, vec![b'a'; 256]).is_err());
        assert!(Pkt::new(PktType::File, Niceness::NORMAL, vec![b'a'; 255]).is_ok());
    }

    #[test]
    fn test_every_retired_magic_is_named() {
        for retired in RETIRED {
            match check_magic(&retired.magic, retired.family) {
                Err(CoreError::ObsoleteVersion { what, .. }) => assert_eq!(what, retired.what),
                other => panic!("expected obsolete version, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_magic_from_other_family_is_unknown() {
        let err = check_magic(&magic::PKT_ENC_V3, MagicFamily::Pkt).unwrap_err();
        assert!(matches!(err, CoreError::UnknownMagic { .. }));
    }

    #[test]
    fn test_obsolete_pkt_rejected_on_read() {
        let mut bytes = magic::PKT_V2.to_vec();
        bytes.extend_from_slice(&[0, 96, 0]);
        assert!(matches!(
            Pkt::split_from(&bytes),
            Err(CoreError::ObsoleteVersion { .. })
        ));
    }

    #[test]
    fn test_truncated_pkt() {
        let bytes = magic::PKT_V3.to_vec();
        assert!(matches!(
            Pkt::split_from(&bytes),
            Err(CoreError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_niceness_parse() {
        assert_eq!("100".parse::<Niceness>().unwrap(), Niceness(100));
        assert_eq!("bulk".parse::<Niceness>().unwrap(), Niceness::BULK);
        assert_eq!("normal+4".parse::<Niceness>().unwrap(), Niceness(100));
        assert_eq!("P-2".parse::<Niceness>().unwrap(), Niceness(62));
        assert_eq!("max".parse::<Niceness>().unwrap(), Niceness::MAX);
        assert!("normal+40".parse::<Niceness>().is_err());
        assert!("urgent".parse::<Niceness>().is_err());
    }

    #[test]
    fn test_niceness_display() {
        assert_eq!(Niceness::FLASH.to_string(), "flash");
        assert_eq!(Niceness(100).to_string(), "normal+4");
        assert_eq!(Niceness(62).to_string(), "priority-2");
        assert_eq!(Niceness(5).to_string(), "flash-27");
        assert_eq!(Niceness(250).to_string(), "250");
        assert_eq!(Niceness::MAX.to_string(), "max");
    }
}
