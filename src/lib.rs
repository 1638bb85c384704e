//! Streaming ingestion engine for line-delimited metric protocols.
//!
//! `linegate` accepts arbitrarily large, optionally gzip-compressed request
//! bodies, reassembles complete protocol lines across fixed-size pooled
//! buffers, and forwards each completed line to a pluggable parser/sink pair.
//! No request ever holds more than one buffer at a time, so memory stays
//! bounded under concurrent load.
//!
//! The crate is transport-agnostic: the embedding HTTP server converts each
//! inbound request into a [`Request`] and writes the returned [`Response`]
//! back out. The line-protocol grammar lives behind the [`LineParser`] seam
//! and the metrics accumulator behind [`RecordSink`].

pub mod body;
pub mod config;
pub mod error;
pub mod handler;
pub mod pool;
pub mod reassembly;
pub mod record;

pub use body::{GzipBody, LimitedBody};
pub use config::{DEFAULT_MAX_BODY_SIZE, DEFAULT_TIMEOUT, ListenerConfig};
pub use error::{BodyLimitExceeded, IngestError};
pub use handler::{
    ContentEncoding,
    IngestHandler,
    Request,
    Response,
    Status,
    VERSION_HEADER_NAME,
    VERSION_HEADER_VALUE,
};
pub use pool::{
    BufferPool,
    MAX_LINE_SIZE,
    PoolConfig,
    PooledBuffer,
    SMALL_BUFFER_SIZE,
    SizeClassConfig,
};
pub use reassembly::{BodyOutcome, LINE_DELIMITER, Reassembler};
pub use record::{FieldValue, LineParser, ParseError, Record, RecordSink};
