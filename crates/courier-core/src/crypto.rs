//! Node key material.
//!
//! Every node carries three key pairs:
//!
//! - **exchange** (X25519): recipients of encrypted packets
//! - **signing** (Ed25519): authenticates the sender of an encrypted packet
//! - **noise** (X25519): the static key of the online handshake
//!
//! The noise pair is optional; a node without it can still send and receive
//! packets offline but cannot take part in a sync session.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::{CoreError, Result};
use crate::types::{AreaId, NodeId};

const NODE_ID_CONTEXT: &str = "courier 2024 node id";
const AREA_ID_CONTEXT: &str = "courier 2024 area id";

/// An X25519 public key used to encrypt packets to a node or area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangePublicKey(pub [u8; 32]);

impl ExchangePublicKey {
    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to x25519-dalek PublicKey.
    pub fn to_dalek(&self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

/// An Ed25519 public key used to verify packet headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SigningPublicKey(pub [u8; 32]);

impl SigningPublicKey {
    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify a signature over a message.
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> Result<()> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;
        key.verify(message, &Signature::from_bytes(signature))
            .map_err(|_| CoreError::BadSignature)
    }
}

/// The static X25519 public key a node presents in the online handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoisePublicKey(pub [u8; 32]);

impl NoisePublicKey {
    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Public half of a node, as held in the neighbour table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerNode {
    /// Derived from the keys below.
    pub id: NodeId,
    pub exchange: ExchangePublicKey,
    pub signing: SigningPublicKey,
    pub noise: Option<NoisePublicKey>,
}

impl PeerNode {
    /// Assemble a peer from its public keys, deriving the node id.
    ///
    /// `id = BLAKE3-derive-key(ctx, exchange || signing || noise?)`
    pub fn new(
        exchange: ExchangePublicKey,
        signing: SigningPublicKey,
        noise: Option<NoisePublicKey>,
    ) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(NODE_ID_CONTEXT);
        hasher.update(&exchange.0);
        hasher.update(&signing.0);
        if let Some(noise) = &noise {
            hasher.update(&noise.0);
        }
        Self {
            id: NodeId(*hasher.finalize().as_bytes()),
            exchange,
            signing,
            noise,
        }
    }

    /// The transport key, or an error naming the node.
    pub fn noise_key(&self) -> Result<NoisePublicKey> {
        self.noise
            .ok_or_else(|| CoreError::MissingNoiseKey(self.id.to_base32()))
    }
}

/// A node's private key material.
pub struct NodeIdentity {
    exchange: StaticSecret,
    signing: SigningKey,
    noise: Option<Zeroizing<[u8; 32]>>,
    public: PeerNode,
}

impl NodeIdentity {
    /// Generate a fresh identity including a transport key.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let exchange = StaticSecret::random_from_rng(&mut rng);
        let signing = SigningKey::generate(&mut rng);
        let noise = StaticSecret::random_from_rng(&mut rng).to_bytes();
        Self::assemble(exchange, signing, Some(noise))
    }

    /// Rebuild an identity from stored secret bytes.
    pub fn from_secrets(exchange: [u8; 32], signing: [u8; 32], noise: Option<[u8; 32]>) -> Self {
        Self::assemble(
            StaticSecret::from(exchange),
            SigningKey::from_bytes(&signing),
            noise,
        )
    }

    fn assemble(exchange: StaticSecret, signing: SigningKey, noise: Option<[u8; 32]>) -> Self {
        let public = PeerNode::new(
            ExchangePublicKey(*PublicKey::from(&exchange).as_bytes()),
            SigningPublicKey(signing.verifying_key().to_bytes()),
            noise.map(|secret| {
                NoisePublicKey(*PublicKey::from(&StaticSecret::from(secret)).as_bytes())
            }),
        );
        Self {
            exchange,
            signing,
            noise: noise.map(Zeroizing::new),
            public,
        }
    }

    /// This node's id.
    pub fn id(&self) -> NodeId {
        self.public.id
    }

    /// The public half, suitable for a peer's neighbour table.
    pub fn public(&self) -> &PeerNode {
        &self.public
    }

    /// X25519 agreement with the exchange secret.
    pub fn diffie_hellman(&self, peer: &ExchangePublicKey) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(*self.exchange.diffie_hellman(&peer.to_dalek()).as_bytes())
    }

    /// Sign with the Ed25519 key.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    /// Private transport key bytes, if this node has one.
    pub fn noise_private(&self) -> Option<&[u8; 32]> {
        self.noise.as_deref()
    }
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeIdentity({:?})", self.public.id)
    }
}

/// A group recipient.
///
/// Members share the area's exchange key pair; a packet sealed to the area
/// public key can be opened by any member holding the secret. Relays that
/// only forward area traffic hold the public half alone.
pub struct Area {
    pub id: AreaId,
    pub public: ExchangePublicKey,
    secret: Option<StaticSecret>,
}

impl Area {
    /// Create a new area with a fresh key pair.
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(rand::thread_rng()).to_bytes())
    }

    /// Rebuild a member's view of an area from the shared secret.
    pub fn from_secret(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = ExchangePublicKey(*PublicKey::from(&secret).as_bytes());
        Self {
            id: Self::derive_id(&public),
            public,
            secret: Some(secret),
        }
    }

    /// A non-member's view of an area.
    pub fn public_only(public: ExchangePublicKey) -> Self {
        Self {
            id: Self::derive_id(&public),
            public,
            secret: None,
        }
    }

    /// Derive an area id from its public key.
    pub fn derive_id(public: &ExchangePublicKey) -> AreaId {
        AreaId(blake3::derive_key(AREA_ID_CONTEXT, &public.0))
    }

    /// Whether this process can open packets addressed to the area.
    pub fn is_member(&self) -> bool {
        self.secret.is_some()
    }

    /// X25519 agreement with the area secret, if held.
    pub fn diffie_hellman(&self, peer: &ExchangePublicKey) -> Option<Zeroizing<[u8; 32]>> {
        self.secret
            .as_ref()
            .map(|s| Zeroizing::new(*s.diffie_hellman(&peer.to_dalek()).as_bytes()))
    }
}

impl fmt::Debug for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Area({:?}, member={})", self.id, self.is_member())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_deterministic_from_secrets() {
        let a = NodeIdentity::from_secrets([1; 32], [2; 32], Some([3; 32]));
        let b = NodeIdentity::from_secrets([1; 32], [2; 32], Some([3; 32]));
        assert_eq!(a.id(), b.id());
        assert_eq!(a.public(), b.public());
    }

    #[test]
    fn test_node_id_covers_every_key() {
        let base = NodeIdentity::from_secrets([1; 32], [2; 32], Some([3; 32]));
        let other_noise = NodeIdentity::from_secrets([1; 32], [2; 32], Some([4; 32]));
        let no_noise = NodeIdentity::from_secrets([1; 32], [2; 32], None);
        assert_ne!(base.id(), other_noise.id());
        assert_ne!(base.id(), no_noise.id());
    }

    #[test]
    fn test_sign_verify() {
        let node = NodeIdentity::generate();
        let sig = node.sign(b"header");
        node.public().signing.verify(b"header", &sig).unwrap();
        assert!(node.public().signing.verify(b"headeR", &sig).is_err());
    }

    #[test]
    fn test_exchange_agreement() {
        let a = NodeIdentity::generate();
        let b = NodeIdentity::generate();
        let ab = a.diffie_hellman(&b.public().exchange);
        let ba = b.diffie_hellman(&a.public().exchange);
        assert_eq!(*ab, *ba);
    }

    #[test]
    fn test_missing_noise_key() {
        let node = NodeIdentity::from_secrets([1; 32], [2; 32], None);
        assert!(node.noise_private().is_none());
        assert!(node.public().noise_key().is_err());
    }

    #[test]
    fn test_area_membership() {
        let member = Area::from_secret([9; 32]);
        let outsider = Area::public_only(member.public);
        assert_eq!(member.id, outsider.id);
        assert!(member.is_member());
        assert!(!outsider.is_member());
        assert!(outsider.diffie_hellman(&member.public).is_none());
    }
}
