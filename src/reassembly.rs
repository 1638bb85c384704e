//! Reassembles complete protocol lines from a streaming body.
//!
//! A session repeatedly fills one pooled buffer, dispatches everything up to
//! the last complete line to the parser, and rotates the undelimited tail to
//! the front of the buffer for the next read. Scanning backward for the last
//! delimiter guarantees at most one record is ever split across a buffer
//! boundary, so memory stays bounded by one buffer per in-flight request
//! regardless of body size.

use std::{io, sync::Arc};

use log::{error, warn};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    error::IngestError,
    pool::{BufferPool, MAX_LINE_SIZE, PooledBuffer},
    record::{LineParser, RecordSink},
};

/// Byte terminating one protocol line.
pub const LINE_DELIMITER: u8 = b'\n';

/// Result of draining one request body to end of stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyOutcome {
    /// Every dispatched span parsed cleanly.
    Accepted,
    /// The body was fully drained but at least one span was rejected.
    Rejected,
}

/// Per-request reassembly state: the active buffer lease, the carry-over
/// length at its front, and the accumulated validity flag.
struct Session {
    buffer: PooledBuffer,
    carry: usize,
    accepted: bool,
}

impl Session {
    fn reject(&mut self, err: &IngestError) {
        error!("{err}");
        self.accepted = false;
    }
}

/// Converts an unbounded byte stream into parsed records.
///
/// Holds the shared buffer pool and the parser/sink collaborators; one
/// instance serves any number of concurrent sessions.
pub struct Reassembler<P, S> {
    pool: Arc<BufferPool>,
    parser: P,
    sink: S,
    max_line_size: usize,
}

impl<P, S> Reassembler<P, S>
where
    P: LineParser,
    S: RecordSink,
{
    /// Create a reassembler over `pool` dispatching to `parser` and `sink`.
    #[must_use]
    pub fn new(pool: Arc<BufferPool>, parser: P, sink: S) -> Self {
        Self {
            pool,
            parser,
            sink,
            max_line_size: MAX_LINE_SIZE,
        }
    }

    /// Drain `body` to end of stream, dispatching every complete line.
    ///
    /// `size_hint` selects the pool class; pass the declared body length when
    /// known so small bodies draw small buffers. Oversized records and parser
    /// rejections mark the session [`BodyOutcome::Rejected`] but draining
    /// continues so the whole request is consumed.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`io::Error`] when the stream fails for a
    /// reason other than end of stream; no further spans are dispatched. The
    /// buffer lease is released on every path.
    pub async fn drain<R>(&self, mut body: R, size_hint: usize) -> io::Result<BodyOutcome>
    where
        R: AsyncRead + Unpin,
    {
        let mut session = Session {
            buffer: self.pool.acquire(size_hint),
            carry: 0,
            accepted: true,
        };

        loop {
            let carry = session.carry;
            let n = fill(&mut body, &mut session.buffer[carry..]).await?;
            let filled = session.carry + n;

            if filled < session.buffer.len() {
                // End of stream: the final fragment may lack a trailing
                // delimiter, and an empty body dispatches an empty span.
                if let Err(err) = self.dispatch(&session.buffer[..filled]) {
                    session.reject(&err);
                }
                break;
            }

            if let Some(at) = last_delimiter(&session.buffer) {
                if let Err(err) = self.dispatch(&session.buffer[..at]) {
                    session.reject(&err);
                }
                let tail = session.buffer.len() - (at + 1);
                session.buffer.copy_within(at + 1.., 0);
                session.carry = tail;
            } else {
                // One record overflows the entire buffer. Skip ahead to its
                // terminating delimiter, report the true length, and keep
                // draining the rest of the body.
                let skipped = skip_past_delimiter(&mut body).await?;
                let err = IngestError::RecordTooLarge {
                    length: session.buffer.len() + skipped,
                    limit: self.max_line_size,
                };
                warn!("{err}");
                session.accepted = false;
                session.carry = 0;
            }
        }

        Ok(if session.accepted {
            BodyOutcome::Accepted
        } else {
            BodyOutcome::Rejected
        })
    }

    fn dispatch(&self, span: &[u8]) -> Result<(), IngestError> {
        let records = self.parser.parse(span)?;
        for record in records {
            self.sink.add_record(record);
        }
        Ok(())
    }
}

/// Read until `buf` is full or the stream ends, returning the bytes read.
async fn fill<R>(body: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = body.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Advance the stream past the next delimiter, returning the bytes skipped
/// (delimiter included). Stops early at end of stream.
async fn skip_past_delimiter<R>(body: &mut R) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut skipped = 0;
    let mut byte = [0_u8; 1];
    loop {
        let n = body.read(&mut byte).await?;
        if n == 0 {
            break;
        }
        skipped += 1;
        if byte[0] == LINE_DELIMITER {
            break;
        }
    }
    Ok(skipped)
}

fn last_delimiter(buf: &[u8]) -> Option<usize> {
    buf.iter().rposition(|&byte| byte == LINE_DELIMITER)
}
