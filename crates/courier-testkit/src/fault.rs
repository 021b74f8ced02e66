//! Fault injection for transports.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Passes through the first `budget` written bytes, then severs the stream.
///
/// Once cut, the inner stream is shut down so the peer sees end of stream,
/// further writes fail with `BrokenPipe` and reads return end of stream.
#[derive(Debug)]
pub struct CutAfter<T> {
    inner: T,
    remaining: u64,
    cut: bool,
}

impl<T> CutAfter<T> {
    pub fn new(inner: T, budget: u64) -> Self {
        Self {
            inner,
            remaining: budget,
            cut: false,
        }
    }

    pub fn is_cut(&self) -> bool {
        self.cut
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for CutAfter<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.cut {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for CutAfter<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.remaining == 0 {
            if !this.cut {
                let _ = ready!(Pin::new(&mut this.inner).poll_shutdown(cx));
                this.cut = true;
            }
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "connection cut",
            )));
        }
        let allowed = buf.len().min(usize::try_from(this.remaining).unwrap_or(usize::MAX));
        let written = ready!(Pin::new(&mut this.inner).poll_write(cx, &buf[..allowed]))?;
        this.remaining -= written as u64;
        Poll::Ready(Ok(written))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.cut {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.cut {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_cut_after_budget() {
        let (a, mut b) = tokio::io::duplex(1024);
        let mut a = CutAfter::new(a, 5);

        a.write_all(b"abc").await.unwrap();
        let err = a.write_all(b"defgh").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(a.is_cut());

        let mut got = Vec::new();
        b.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"abcde");

        let mut buf = [0u8; 4];
        assert_eq!(a.read(&mut buf).await.unwrap(), 0);
    }
}
