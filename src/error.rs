//! Error taxonomy for request ingestion.

use std::io;

use thiserror::Error;

use crate::record::ParseError;

/// Errors produced while ingesting one request body.
///
/// Only [`RequestTooLarge`](Self::RequestTooLarge) and [`Io`](Self::Io)
/// abort a request early. [`RecordTooLarge`](Self::RecordTooLarge) and
/// [`Parse`](Self::Parse) are recovered locally: the offending span is
/// discarded, the session is marked rejected and draining continues so the
/// connection stays consistent for keep-alive reuse.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Declared body length exceeds the configured ceiling.
    #[error("request body of {declared} bytes exceeds limit of {limit} bytes")]
    RequestTooLarge {
        /// Length the request declared.
        declared: u64,
        /// Configured maximum body size.
        limit: u64,
    },

    /// The underlying stream failed for a reason other than end of stream.
    #[error("request body unreadable: {0}")]
    Io(#[from] io::Error),

    /// The body did not decode as the declared compression scheme.
    #[error("request body is not valid compressed data: {0}")]
    MalformedBody(#[source] io::Error),

    /// A single record exceeded the maximum representable size.
    #[error("received a single record of {length} bytes, maximum is {limit} bytes")]
    RecordTooLarge {
        /// True length of the oversized record.
        length: usize,
        /// Configured per-record ceiling.
        limit: usize,
    },

    /// The parser rejected a dispatched span.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Marker error raised by a length-limited body when a read crosses the cap.
///
/// Surfaced as the source of an [`io::Error`] so callers can distinguish an
/// over-long body from a genuinely broken stream by downcasting.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("request body exceeds the configured maximum size")]
pub struct BodyLimitExceeded;
