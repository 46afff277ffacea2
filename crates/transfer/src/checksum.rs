//! Digest of everything written to a sink

use sluice_hash::{Hash, HashAlgorithm, Hasher};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// Forwards writes and hashes exactly the bytes the inner writer accepted
#[derive(Debug)]
pub struct ChecksumWriter<W> {
    inner: W,
    hasher: Hasher,
    written: u64,
}

impl<W> ChecksumWriter<W> {
    pub fn new(inner: W, algorithm: HashAlgorithm) -> Self {
        Self {
            inner,
            hasher: Hasher::new(algorithm),
            written: 0,
        }
    }

    /// Digest of the bytes written so far
    ///
    /// Only final once the writer has been flushed and no further writes follow.
    #[must_use]
    pub fn digest(&self) -> Hash {
        self.hasher.finalize()
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Split into the inner writer and the final digest
    pub fn into_parts(self) -> (W, Hash) {
        let digest = self.hasher.finalize();
        (self.inner, digest)
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ChecksumWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.hasher.update(&buf[..*n]);
            this.written += *n as u64;
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
