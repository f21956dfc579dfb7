//! Cipher stream decorator
//!
//! Wraps any duplex stream with a symmetric keystream transform while
//! presenting the same duplex contract, so upstream connectors and protocol
//! servers never distinguish encrypted from plaintext transports.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::common::Stream;
use crate::error::Result;

use super::{make_transforms, Transform};

/// A duplex stream with independent encrypt (write) and decrypt (read)
/// keystream state. With an empty or unrecognized method this is a pure
/// pass-through.
///
/// Writes encrypt exactly once into an internal pending buffer and drain it
/// across subsequent polls; a `Pending` underlying write therefore can never
/// re-encrypt the same bytes and desynchronize the keystream.
pub struct CipherStream {
    inner: Stream,
    read_transform: Option<Box<dyn Transform>>,
    write_transform: Option<Box<dyn Transform>>,
    pending: Vec<u8>,
    pending_pos: usize,
}

impl CipherStream {
    pub fn new(inner: Stream, method: &str, password: &[u8]) -> Result<Self> {
        let (read_transform, write_transform) = match make_transforms(method, password)? {
            Some((r, w)) => (Some(r), Some(w)),
            None => (None, None),
        };
        Ok(Self {
            inner,
            read_transform,
            write_transform,
            pending: Vec::new(),
            pending_pos: 0,
        })
    }

    /// Drain the internal ciphertext buffer into the inner stream.
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while self.pending_pos < self.pending.len() {
            match Pin::new(&mut self.inner).poll_write(cx, &self.pending[self.pending_pos..]) {
                Poll::Ready(Ok(0)) => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "inner stream rejected buffered ciphertext",
                    )));
                }
                Poll::Ready(Ok(n)) => self.pending_pos += n,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
        self.pending.clear();
        self.pending_pos = 0;
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for CipherStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                if let Some(transform) = &mut this.read_transform {
                    transform.apply(&mut buf.filled_mut()[before..]);
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl AsyncWrite for CipherStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if let Poll::Pending = this.poll_drain(cx)? {
            return Poll::Pending;
        }

        let transform = match &mut this.write_transform {
            None => return Pin::new(&mut this.inner).poll_write(cx, buf),
            Some(t) => t,
        };

        let mut data = buf.to_vec();
        transform.apply(&mut data);

        match Pin::new(&mut this.inner).poll_write(cx, &data) {
            Poll::Ready(Ok(n)) if n == data.len() => Poll::Ready(Ok(buf.len())),
            Poll::Ready(Ok(n)) => {
                this.pending = data;
                this.pending_pos = n;
                Poll::Ready(Ok(buf.len()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => {
                this.pending = data;
                this.pending_pos = 0;
                Poll::Ready(Ok(buf.len()))
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Poll::Pending = this.poll_drain(cx)? {
            return Poll::Pending;
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Poll::Pending = this.poll_drain(cx)? {
            return Poll::Pending;
        }
        // Write direction is finished; release its cipher state before the
        // inner stream goes down.
        this.write_transform = None;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}
