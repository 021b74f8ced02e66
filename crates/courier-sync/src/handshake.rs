//! Noise IK handshake.
//!
//! ```text
//! initiator                              responder
//!   magic ‖ -> e, es, s, ss      ────►
//!                                         look up s in the neighbour table
//!                                ◄────   magic ‖ <- e, ee, se
//! ```
//!
//! The initiator must already know the responder's transport key. The
//! responder learns the initiator's key from message 1 and refuses to answer
//! unless it belongs to a neighbour. Every handshake failure surfaces as
//! [`SyncError::Unauthenticated`]; the detail only reaches the local debug log.

use std::sync::Arc;

use courier_core::packet::magic;
use courier_core::{check_magic, CoreError, MagicFamily, NodeIdentity, NodeRegistry, NoisePublicKey, PeerNode, MAGIC_LEN};
use snow::{Builder, HandshakeState, StatelessTransportState};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::framing::{read_frame, write_frame, MAX_FRAME};

/// Noise protocol name.
pub const NOISE_PATTERN: &str = "Noise_IK_25519_ChaChaPoly_BLAKE2b";

/// Outcome of a successful handshake.
pub struct Established {
    /// The authenticated peer.
    pub peer: PeerNode,
    pub cipher: Arc<StatelessTransportState>,
}

/// Run the initiator side against a known neighbour.
pub async fn initiate<S>(stream: &mut S, identity: &NodeIdentity, peer: &PeerNode) -> Result<Established>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let remote = peer.noise_key()?;
    let local = identity.noise_private().ok_or(SyncError::NoTransportKey)?;
    let mut state = Builder::new(pattern()?)
        .local_private_key(local)
        .remote_public_key(remote.as_bytes())
        .build_initiator()
        .map_err(reject("build initiator"))?;

    let mut msg1 = vec![0u8; MAX_FRAME];
    let len = state.write_message(&[], &mut msg1).map_err(reject("write message 1"))?;
    send_handshake(stream, &msg1[..len]).await?;
    debug!(peer = %peer.id, "sent handshake message 1");

    let msg2 = recv_handshake(stream).await?;
    let mut payload = vec![0u8; msg2.len()];
    state.read_message(&msg2, &mut payload).map_err(reject("read message 2"))?;

    finish(state, peer.clone())
}

/// Run the responder side, admitting only peers the registry knows.
pub async fn respond<S>(stream: &mut S, identity: &NodeIdentity, registry: &dyn NodeRegistry) -> Result<Established>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let local = identity.noise_private().ok_or(SyncError::NoTransportKey)?;
    let mut state = Builder::new(pattern()?)
        .local_private_key(local)
        .build_responder()
        .map_err(reject("build responder"))?;

    let msg1 = recv_handshake(stream).await?;
    let mut payload = vec![0u8; msg1.len()];
    state.read_message(&msg1, &mut payload).map_err(reject("read message 1"))?;

    let peer = remote_peer(&state, registry)?;

    let mut msg2 = vec![0u8; MAX_FRAME];
    let len = state.write_message(&[], &mut msg2).map_err(reject("write message 2"))?;
    send_handshake(stream, &msg2[..len]).await?;
    debug!(peer = %peer.id, "sent handshake message 2");

    finish(state, peer)
}

fn remote_peer(state: &HandshakeState, registry: &dyn NodeRegistry) -> Result<PeerNode> {
    let Some(bytes) = state.get_remote_static() else {
        debug!("handshake carried no static key");
        return Err(SyncError::Unauthenticated);
    };
    let key: [u8; 32] = bytes.try_into().map_err(|_| SyncError::Unauthenticated)?;
    match registry.peer_by_noise_key(&NoisePublicKey(key)) {
        Some(peer) => Ok(peer.clone()),
        None => {
            debug!(key = %hex::encode(key), "handshake from unknown transport key");
            Err(SyncError::Unauthenticated)
        }
    }
}

fn finish(state: HandshakeState, peer: PeerNode) -> Result<Established> {
    let cipher = state
        .into_stateless_transport_mode()
        .map_err(reject("enter transport mode"))?;
    Ok(Established {
        peer,
        cipher: Arc::new(cipher),
    })
}

async fn send_handshake<S: AsyncWrite + Unpin>(stream: &mut S, noise: &[u8]) -> Result<()> {
    let mut frame = Vec::with_capacity(MAGIC_LEN + noise.len());
    frame.extend_from_slice(&magic::SP_V1);
    frame.extend_from_slice(noise);
    write_frame(stream, &frame).await
}

/// Read one handshake frame. Only a retired version is reported as such;
/// any other malformed frame is an authentication failure.
async fn recv_handshake<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Vec<u8>> {
    let frame = match read_frame(stream).await {
        Ok(Some(frame)) => frame,
        Ok(None) => return Err(SyncError::Closed),
        Err(SyncError::FrameTooLarge(len)) => {
            debug!(len, "oversized handshake frame");
            return Err(SyncError::Unauthenticated);
        }
        Err(err) => return Err(err),
    };
    if frame.len() < MAGIC_LEN {
        debug!(len = frame.len(), "short handshake frame");
        return Err(SyncError::Unauthenticated);
    }
    let mut found = [0u8; MAGIC_LEN];
    found.copy_from_slice(&frame[..MAGIC_LEN]);
    match check_magic(&found, MagicFamily::Sp) {
        Ok(()) => Ok(frame[MAGIC_LEN..].to_vec()),
        Err(err @ CoreError::ObsoleteVersion { .. }) => Err(err.into()),
        Err(err) => {
            debug!(error = %err, "handshake frame with foreign magic");
            Err(SyncError::Unauthenticated)
        }
    }
}

fn pattern() -> Result<snow::params::NoiseParams> {
    NOISE_PATTERN
        .parse()
        .map_err(|_| SyncError::Protocol("invalid Noise pattern".into()))
}

fn reject(step: &'static str) -> impl Fn(snow::Error) -> SyncError {
    move |err| {
        debug!(step, error = %err, "handshake rejected");
        SyncError::Unauthenticated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::Neighbors;
    use tokio::io::AsyncWriteExt;

    fn pair() -> (NodeIdentity, NodeIdentity) {
        (NodeIdentity::generate(), NodeIdentity::generate())
    }

    #[tokio::test]
    async fn test_handshake_between_neighbours() {
        let (alice, bob) = pair();
        let alice_id = alice.id();
        let bob_knows = Neighbors::new().with_named("alice", alice.public().clone());
        let (mut a, mut b) = tokio::io::duplex(4096);

        let bob_public = bob.public().clone();
        let init = tokio::spawn(async move { initiate(&mut a, &alice, &bob_public).await });
        let resp = respond(&mut b, &bob, &bob_knows).await.unwrap();
        let init = init.await.unwrap().unwrap();

        assert_eq!(init.peer.id, bob.id());
        assert_eq!(resp.peer.id, alice_id);

        let mut ct = vec![0u8; 64];
        let n = init.cipher.write_message(0, b"ping", &mut ct).unwrap();
        let mut pt = vec![0u8; 64];
        let m = resp.cipher.read_message(0, &ct[..n], &mut pt).unwrap();
        assert_eq!(&pt[..m], b"ping");
    }

    #[tokio::test]
    async fn test_unknown_initiator_rejected() {
        let (alice, bob) = pair();
        let (mut a, mut b) = tokio::io::duplex(4096);

        let bob_public = bob.public().clone();
        let init = tokio::spawn(async move { initiate(&mut a, &alice, &bob_public).await });
        let err = respond(&mut b, &bob, &Neighbors::new()).await.err().unwrap();
        assert!(matches!(err, SyncError::Unauthenticated));
        drop(b);

        // Initiator sees the connection close without an answer.
        assert!(init.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_wrong_responder_key_rejected() {
        let (alice, bob) = pair();
        let impostor = NodeIdentity::generate();
        let knows = Neighbors::new().with_named("alice", alice.public().clone());
        let (mut a, mut b) = tokio::io::duplex(4096);

        // Alice expects bob but reaches the impostor.
        let bob_public = bob.public().clone();
        let init = tokio::spawn(async move { initiate(&mut a, &alice, &bob_public).await });
        let err = respond(&mut b, &impostor, &knows).await.err().unwrap();
        assert!(matches!(err, SyncError::Unauthenticated));
        drop(b);
        assert!(init.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_retired_magic_is_obsolete() {
        let bob = NodeIdentity::generate();
        let (mut a, mut b) = tokio::io::duplex(4096);
        let mut frame = magic::SP_V0.to_vec();
        frame.extend_from_slice(&[0u8; 48]);
        write_frame(&mut a, &frame).await.unwrap();
        a.flush().await.unwrap();

        let err = respond(&mut b, &bob, &Neighbors::new()).await.err().unwrap();
        assert!(matches!(err, SyncError::ObsoleteVersion { .. }));
    }

    #[tokio::test]
    async fn test_malformed_first_frame_is_unauthenticated() {
        let bob = NodeIdentity::generate();
        let mut foreign = magic::PKT_ENC_V3.to_vec();
        foreign.extend_from_slice(&[0u8; 48]);
        for frame in [b"SP".to_vec(), foreign] {
            let (mut a, mut b) = tokio::io::duplex(4096);
            write_frame(&mut a, &frame).await.unwrap();
            a.flush().await.unwrap();
            let err = respond(&mut b, &bob, &Neighbors::new()).await.err().unwrap();
            assert!(matches!(err, SyncError::Unauthenticated), "{err:?}");
        }
    }

    #[tokio::test]
    async fn test_initiator_without_transport_key() {
        let alice = NodeIdentity::from_secrets([1; 32], [2; 32], None);
        let bob = NodeIdentity::generate();
        let (mut a, _b) = tokio::io::duplex(4096);
        let err = initiate(&mut a, &alice, bob.public()).await.err().unwrap();
        assert!(matches!(err, SyncError::NoTransportKey));
    }
}
