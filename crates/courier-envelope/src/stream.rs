//! Streaming seal and open.
//!
//! After the clear header the plaintext is cut into [`BLOCK_SIZE`] chunks,
//! each sealed with ChaCha20-Poly1305 under a key derived from an
//! ephemeral X25519 exchange and the full header. The nonce is the chunk
//! counter and the associated data marks the final chunk. Every chunk but
//! the last carries exactly `BLOCK_SIZE` bytes; the last carries fewer,
//! possibly none.

use std::io::{self, Read, Write};

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use courier_core::{
    Area, AreaId, ExchangePublicKey, Niceness, NodeId, NodeIdentity, NodeRegistry, PeerNode, Pkt,
    BLOCK_SIZE,
};
use tracing::{debug, warn};
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroizing;

use crate::error::{EnvelopeError, Result};
use crate::header::{PktEncHeader, PKT_ENC_OVERHEAD};

const CHUNK_KEY_CONTEXT: &str = "courier pktenc v3";

/// Poly1305 tag per chunk.
pub const TAG_LEN: usize = 16;

/// Where a packet is sealed to.
#[derive(Debug, Clone, Copy)]
pub struct Recipient {
    pub id: NodeId,
    pub exchange: ExchangePublicKey,
}

impl From<&PeerNode> for Recipient {
    fn from(peer: &PeerNode) -> Self {
        Self {
            id: peer.id,
            exchange: peer.exchange,
        }
    }
}

impl From<&Area> for Recipient {
    fn from(area: &Area) -> Self {
        Self {
            id: area.id.into(),
            exchange: area.public,
        }
    }
}

/// Size of a sealed packet for a plaintext of `plain_len` bytes.
pub fn sealed_len(plain_len: u64) -> u64 {
    let chunks = plain_len / BLOCK_SIZE as u64 + 1;
    PKT_ENC_OVERHEAD as u64 + plain_len + chunks * TAG_LEN as u64
}

fn chunk_cipher(dh: &[u8; 32], header: &[u8; PKT_ENC_OVERHEAD]) -> ChaCha20Poly1305 {
    let mut hasher = blake3::Hasher::new_derive_key(CHUNK_KEY_CONTEXT);
    hasher.update(dh);
    hasher.update(header);
    let key = Zeroizing::new(*hasher.finalize().as_bytes());
    ChaCha20Poly1305::new(Key::from_slice(&key[..]))
}

fn chunk_nonce(counter: u64) -> Nonce {
    let mut nonce = [0u8; 12];
    nonce[4..].copy_from_slice(&counter.to_be_bytes());
    *Nonce::from_slice(&nonce)
}

/// Read until `buf` is full or the source ends.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Seal `plaintext` from `sender` to `recipient`, streaming into `out`.
///
/// Returns the number of bytes written.
pub fn seal<R: Read, W: Write>(
    sender: &NodeIdentity,
    recipient: Recipient,
    nice: Niceness,
    mut plaintext: R,
    mut out: W,
) -> Result<u64> {
    let ephemeral = EphemeralSecret::random_from_rng(rand::thread_rng());
    let mut header = PktEncHeader {
        nice,
        sender: sender.id(),
        recipient: recipient.id,
        ephemeral: ExchangePublicKey(*PublicKey::from(&ephemeral).as_bytes()),
        signature: [0u8; 64],
    };
    header.signature = sender.sign(&header.signed_bytes());
    let header_bytes = header.to_bytes();
    out.write_all(&header_bytes)?;

    let dh = Zeroizing::new(
        *ephemeral
            .diffie_hellman(&recipient.exchange.to_dalek())
            .as_bytes(),
    );
    let cipher = chunk_cipher(&dh, &header_bytes);

    let mut buf = Zeroizing::new(vec![0u8; BLOCK_SIZE]);
    let mut written = PKT_ENC_OVERHEAD as u64;
    let mut counter = 0u64;
    loop {
        let n = read_full(&mut plaintext, &mut buf)?;
        let last = n < BLOCK_SIZE;
        let sealed = cipher
            .encrypt(
                &chunk_nonce(counter),
                Payload {
                    msg: &buf[..n],
                    aad: &[last as u8],
                },
            )
            .map_err(|_| EnvelopeError::Cipher)?;
        out.write_all(&sealed)?;
        written += sealed.len() as u64;
        if last {
            break;
        }
        counter += 1;
    }
    out.flush()?;

    debug!(
        recipient = %recipient.id,
        nice = %nice,
        chunks = counter + 1,
        bytes = written,
        "sealed packet"
    );
    Ok(written)
}

/// Seal a plaintext packet header followed by its payload.
pub fn seal_packet<R: Read, W: Write>(
    sender: &NodeIdentity,
    recipient: Recipient,
    pkt: &Pkt,
    payload: R,
    out: W,
) -> Result<u64> {
    let head = pkt.to_bytes();
    seal(sender, recipient, pkt.nice, head.as_slice().chain(payload), out)
}

/// Outcome of a successful open.
#[derive(Debug, Clone)]
pub struct Opened {
    pub header: PktEncHeader,
    /// False only for an unknown sender accepted without verification.
    pub sender_verified: bool,
    /// The packet was addressed to an area rather than this node.
    pub area: Option<AreaId>,
    pub plaintext_len: u64,
}

/// Which checks [`open`] applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Reject packets whose sender is not in the registry.
    pub require_known_sender: bool,
}

fn recipient_secret(
    identity: &NodeIdentity,
    registry: &dyn NodeRegistry,
    header: &PktEncHeader,
) -> Result<(Zeroizing<[u8; 32]>, Option<AreaId>)> {
    if header.recipient == identity.id() {
        return Ok((identity.diffie_hellman(&header.ephemeral), None));
    }
    let area_id = AreaId::from(header.recipient);
    registry
        .area(&area_id)
        .and_then(|area| area.diffie_hellman(&header.ephemeral))
        .map(|dh| (dh, Some(area_id)))
        .ok_or(EnvelopeError::WrongRecipient(header.recipient))
}

fn check_sender(
    identity: &NodeIdentity,
    registry: &dyn NodeRegistry,
    header: &PktEncHeader,
    options: OpenOptions,
) -> Result<bool> {
    let signing = if header.sender == identity.id() {
        Some(identity.public().signing)
    } else {
        registry.neighbor(&header.sender).map(|peer| peer.signing)
    };
    match signing {
        Some(key) => {
            key.verify(&header.signed_bytes(), &header.signature)?;
            Ok(true)
        }
        None if options.require_known_sender => Err(EnvelopeError::UnknownSender(header.sender)),
        None => {
            warn!(sender = %header.sender, "accepting packet from unknown sender unverified");
            Ok(false)
        }
    }
}

/// Open a sealed packet, writing each verified chunk to `out`.
///
/// On error, `out` may already hold the chunks that verified before the
/// failing one. Use [`open_to_vec`] when nothing must be released early.
pub fn open<R: Read, W: Write>(
    identity: &NodeIdentity,
    registry: &dyn NodeRegistry,
    options: OpenOptions,
    mut input: R,
    mut out: W,
) -> Result<Opened> {
    let header = PktEncHeader::read_from(&mut input)?;
    let sender_verified = check_sender(identity, registry, &header, options)?;
    let (dh, area) = recipient_secret(identity, registry, &header)?;
    let cipher = chunk_cipher(&dh, &header.to_bytes());

    let mut buf = vec![0u8; BLOCK_SIZE + TAG_LEN];
    let mut plaintext_len = 0u64;
    let mut counter = 0u64;
    loop {
        let n = read_full(&mut input, &mut buf)?;
        let last = n < buf.len();
        if last && n < TAG_LEN {
            return Err(EnvelopeError::Truncated);
        }
        let plain = Zeroizing::new(
            cipher
                .decrypt(
                    &chunk_nonce(counter),
                    Payload {
                        msg: &buf[..n],
                        aad: &[last as u8],
                    },
                )
                .map_err(|_| EnvelopeError::Authentication { chunk: counter })?,
        );
        out.write_all(&plain)?;
        plaintext_len += plain.len() as u64;
        if last {
            break;
        }
        counter += 1;
    }
    if read_full(&mut input, &mut [0u8; 1])? != 0 {
        return Err(EnvelopeError::TrailingData);
    }
    out.flush()?;

    debug!(
        sender = %header.sender,
        verified = sender_verified,
        bytes = plaintext_len,
        "opened packet"
    );
    Ok(Opened {
        header,
        sender_verified,
        area,
        plaintext_len,
    })
}

/// Open a sealed packet into memory; no plaintext is returned on failure.
pub fn open_to_vec<R: Read>(
    identity: &NodeIdentity,
    registry: &dyn NodeRegistry,
    options: OpenOptions,
    input: R,
) -> Result<(Opened, Vec<u8>)> {
    let mut plaintext = Vec::new();
    let opened = open(identity, registry, options, input, &mut plaintext)?;
    Ok((opened, plaintext))
}
