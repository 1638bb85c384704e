//! Async body adapters: hard length limiting and gzip decompression.
//!
//! Both adapters wrap an arbitrary [`AsyncRead`] body. [`LimitedBody`] fails
//! the stream once a read crosses the configured cap, guarding against a
//! missing or lying length header. [`GzipBody`] transparently unwraps a gzip
//! body before it reaches the reassembler; malformed input surfaces as an
//! error on the first read.

use std::{
    io::{self, Read},
    pin::Pin,
    task::{Context, Poll},
};

use flate2::read::MultiGzDecoder;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::BodyLimitExceeded;

/// How many bytes to pull from the inner stream per decoder refill.
const FEED_CHUNK_SIZE: usize = 8 * 1024;

/// A body that yields at most `limit` bytes.
///
/// Reading exactly `limit` bytes followed by end of stream succeeds; a read
/// attempt that finds further data fails with an [`io::Error`] whose source
/// is [`BodyLimitExceeded`].
#[derive(Debug)]
pub struct LimitedBody<R> {
    inner: R,
    remaining: u64,
}

impl<R> LimitedBody<R> {
    /// Wrap `inner`, allowing at most `limit` bytes to be read.
    #[must_use]
    pub fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for LimitedBody<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;

        if this.remaining == 0 {
            // Probe for one more byte to tell end of stream from overflow.
            let mut probe = [0_u8; 1];
            let mut probe_buf = ReadBuf::new(&mut probe);
            return match Pin::new(&mut this.inner).poll_read(cx, &mut probe_buf) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
                Poll::Ready(Ok(())) if probe_buf.filled().is_empty() => Poll::Ready(Ok(())),
                Poll::Ready(Ok(())) => Poll::Ready(Err(io::Error::other(BodyLimitExceeded))),
            };
        }

        let allowed = usize::try_from(this.remaining)
            .unwrap_or(usize::MAX)
            .min(buf.remaining());
        let window = buf.initialize_unfilled_to(allowed);
        let mut limited = ReadBuf::new(window);
        match Pin::new(&mut this.inner).poll_read(cx, &mut limited) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
            Poll::Ready(Ok(())) => {
                let n = limited.filled().len();
                this.remaining -= n as u64;
                buf.advance(n);
                Poll::Ready(Ok(()))
            }
        }
    }
}

/// Synchronous feed buffer bridging polled input into the gzip decoder.
///
/// Empty-but-not-finished reads report `WouldBlock`, which the decoder
/// propagates; [`GzipBody`] refills the buffer and retries.
#[derive(Debug, Default)]
struct FeedBuffer {
    chunk: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl FeedBuffer {
    fn is_drained(&self) -> bool { self.pos >= self.chunk.len() }
}

impl Read for FeedBuffer {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = &self.chunk[self.pos..];
        if available.is_empty() {
            if self.eof {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// A body that yields the decompressed content of a gzip stream.
///
/// Built on [`MultiGzDecoder`], so concatenated gzip members decode as one
/// continuous stream. Input that is not valid gzip fails on the first read
/// with an [`io::Error`] of kind `InvalidInput` or `InvalidData`. Dropping
/// the adapter releases the decoder and the inner body on every exit path.
#[derive(Debug)]
pub struct GzipBody<R> {
    inner: R,
    decoder: MultiGzDecoder<FeedBuffer>,
}

impl<R> GzipBody<R> {
    /// Wrap `inner`, decoding it as gzip.
    #[must_use]
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            decoder: MultiGzDecoder::new(FeedBuffer::default()),
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for GzipBody<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;

        loop {
            match this.decoder.read(buf.initialize_unfilled()) {
                Ok(n) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    let feed = this.decoder.get_mut();
                    debug_assert!(feed.is_drained(), "decoder starved with bytes left");
                    feed.chunk.resize(FEED_CHUNK_SIZE, 0);
                    feed.pos = 0;
                    let mut refill = ReadBuf::new(&mut feed.chunk);
                    match Pin::new(&mut this.inner).poll_read(cx, &mut refill) {
                        Poll::Pending => {
                            feed.chunk.clear();
                            return Poll::Pending;
                        }
                        Poll::Ready(Err(err)) => {
                            feed.chunk.clear();
                            return Poll::Ready(Err(err));
                        }
                        Poll::Ready(Ok(())) => {
                            let n = refill.filled().len();
                            feed.chunk.truncate(n);
                            if n == 0 {
                                feed.eof = true;
                            }
                        }
                    }
                }
                Err(err) => return Poll::Ready(Err(err)),
            }
        }
    }
}
