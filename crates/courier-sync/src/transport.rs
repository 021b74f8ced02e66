//! Byte streams a session can run over.

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};

/// Any duplex byte stream: TCP, a pipe, or an in-memory pair.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Connected in-memory transports, each side buffering up to `capacity` bytes.
pub fn memory_pair(capacity: usize) -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn assert_transport<T: Transport>(_: &T) {}

    #[tokio::test]
    async fn test_memory_pair_is_duplex() {
        let (mut a, mut b) = memory_pair(64);
        assert_transport(&a);
        a.write_all(b"ping").await.unwrap();
        b.write_all(b"pong").await.unwrap();

        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        a.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }
}
