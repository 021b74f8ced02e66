//! Length-prefixed frames over a byte stream.
//!
//! `u32 BE length ‖ body`. During the handshake the body is the Sp magic
//! followed by a Noise message; afterwards it is Noise transport ciphertext.

use std::sync::Arc;

use snow::StatelessTransportState;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, SyncError};
use crate::messages::SpMessage;

/// Largest Noise message, and so the largest frame body.
pub const MAX_FRAME: usize = 65535;
const TAG_LEN: usize = 16;
/// Largest encoded message that fits one frame.
pub const MAX_PLAINTEXT: usize = MAX_FRAME - TAG_LEN;

/// Write one frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8]) -> Result<()> {
    if body.len() > MAX_FRAME {
        return Err(SyncError::FrameTooLarge(body.len()));
    }
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. `None` on end of stream at a frame boundary.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len = [0u8; 4];
    if reader.read(&mut len[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut len[1..]).await?;
    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_FRAME {
        return Err(SyncError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Encrypting half of an established session.
pub struct FrameSealer {
    cipher: Arc<StatelessTransportState>,
    nonce: u64,
}

impl FrameSealer {
    pub fn new(cipher: Arc<StatelessTransportState>) -> Self {
        Self { cipher, nonce: 0 }
    }

    /// Encode, encrypt and write one message.
    pub async fn send<W: AsyncWrite + Unpin>(&mut self, writer: &mut W, msg: &SpMessage) -> Result<()> {
        let plain = msg.encode()?;
        if plain.len() > MAX_PLAINTEXT {
            return Err(SyncError::FrameTooLarge(plain.len()));
        }
        let mut out = vec![0u8; plain.len() + TAG_LEN];
        let len = self
            .cipher
            .write_message(self.nonce, &plain, &mut out)
            .map_err(|e| SyncError::Protocol(format!("encrypt: {e}")))?;
        self.nonce += 1;
        out.truncate(len);
        write_frame(writer, &out).await
    }
}

/// Decrypting half of an established session.
pub struct FrameOpener {
    cipher: Arc<StatelessTransportState>,
    nonce: u64,
}

impl FrameOpener {
    pub fn new(cipher: Arc<StatelessTransportState>) -> Self {
        Self { cipher, nonce: 0 }
    }

    /// Read, decrypt and decode one message. `None` on clean end of stream.
    pub async fn recv<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<Option<SpMessage>> {
        let Some(frame) = read_frame(reader).await? else {
            return Ok(None);
        };
        let mut plain = vec![0u8; frame.len()];
        let len = self
            .cipher
            .read_message(self.nonce, &frame, &mut plain)
            .map_err(SyncError::Decrypt)?;
        self.nonce += 1;
        SpMessage::decode(&plain[..len]).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_preserve_boundaries() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, b"one").await.unwrap();
        write_frame(&mut a, b"").await.unwrap();
        write_frame(&mut a, b"three").await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b).await.unwrap().unwrap(), b"one");
        assert_eq!(read_frame(&mut b).await.unwrap().unwrap(), b"");
        assert_eq!(read_frame(&mut b).await.unwrap().unwrap(), b"three");
        assert!(read_frame(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_u32(MAX_FRAME as u32 + 1).await.unwrap();
        assert!(matches!(
            read_frame(&mut b).await,
            Err(SyncError::FrameTooLarge(_))
        ));
        assert!(matches!(
            write_frame(&mut a, &vec![0; MAX_FRAME + 1]).await,
            Err(SyncError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_io_error() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_u32(10).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);
        assert!(matches!(read_frame(&mut b).await, Err(SyncError::Io(_))));
    }
}
