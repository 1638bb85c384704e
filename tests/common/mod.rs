//! Shared fixtures for integration tests.
//!
//! Provides a toy `name=value` parser, a collecting sink, gzip helpers and
//! scripted body readers. These helpers reduce duplication across test
//! modules.

// Items in this shared module may not be used by all test binaries that
// import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{
    collections::{BTreeMap, VecDeque},
    io::Write,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};

use flate2::{Compression, write::GzEncoder};
use linegate::{FieldValue, LineParser, ParseError, Record, RecordSink};
use tokio::io::{AsyncRead, ReadBuf};

/// Parser for `name=value` lines; the value becomes a single float field.
///
/// Empty lines are skipped so a carried-over leading delimiter or an empty
/// final span yields zero records.
pub struct SplitParser;

impl LineParser for SplitParser {
    fn parse(&self, input: &[u8]) -> Result<Vec<Record>, ParseError> {
        let text = std::str::from_utf8(input)
            .map_err(|err| ParseError(format!("invalid utf-8: {err}")))?;
        let mut records = Vec::new();
        for line in text.split('\n') {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once('=')
                .ok_or_else(|| ParseError(format!("missing '=' in {line:?}")))?;
            let value: f64 = value
                .parse()
                .map_err(|err| ParseError(format!("bad value in {line:?}: {err}")))?;
            let mut fields = BTreeMap::new();
            fields.insert("value".to_string(), FieldValue::Float(value));
            records.push(Record {
                name: name.to_string(),
                tags: BTreeMap::new(),
                fields,
                timestamp: None,
            });
        }
        Ok(records)
    }
}

/// Sink that stores every record for later assertions.
#[derive(Clone, Default)]
pub struct CollectingSink {
    records: Arc<Mutex<Vec<Record>>>,
}

impl CollectingSink {
    pub fn records(&self) -> Vec<Record> { self.records.lock().expect("records lock").clone() }

    pub fn names(&self) -> Vec<String> {
        self.records().into_iter().map(|record| record.name).collect()
    }
}

impl RecordSink for CollectingSink {
    fn add_record(&self, record: Record) {
        self.records.lock().expect("records lock").push(record);
    }
}

/// Gzip-compress `data` with default settings.
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

/// Body that yields scripted chunks, at most one chunk per physical read.
pub struct ChunkedBody {
    chunks: VecDeque<Vec<u8>>,
    pos: usize,
}

impl ChunkedBody {
    pub fn new<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self {
            chunks: chunks.into_iter().collect(),
            pos: 0,
        }
    }
}

impl AsyncRead for ChunkedBody {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = &mut *self;
        let Some(chunk) = this.chunks.front() else {
            return Poll::Ready(Ok(()));
        };
        let available = &chunk[this.pos..];
        let n = available.len().min(buf.remaining());
        buf.put_slice(&available[..n]);
        this.pos += n;
        if this.pos >= chunk.len() {
            this.chunks.pop_front();
            this.pos = 0;
        }
        Poll::Ready(Ok(()))
    }
}

/// Body wrapper counting how many bytes were actually read from it.
pub struct CountingBody<R> {
    inner: R,
    count: Arc<AtomicUsize>,
}

impl<R> CountingBody<R> {
    pub fn new(inner: R) -> (Self, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                count: Arc::clone(&count),
            },
            count,
        )
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CountingBody<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = &mut *self;
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                this.count
                    .fetch_add(buf.filled().len() - before, Ordering::Relaxed);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
