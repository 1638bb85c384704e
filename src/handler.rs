//! Request routing and the write ingestion endpoint.
//!
//! The embedding HTTP server hands each request to [`IngestHandler::handle`]
//! and writes the returned [`Response`] back out; listener lifecycle, TLS and
//! timeouts stay on that side of the boundary. Besides the write path, two
//! fixed compatibility routes are exposed: a no-op query acknowledgement
//! (some clients probe endpoint availability with a query) and a liveness
//! ping.

use std::{io, sync::Arc};

use bytes::Bytes;
use log::error;
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::{
    body::{GzipBody, LimitedBody},
    config::ListenerConfig,
    error::IngestError,
    pool::{BufferPool, MAX_LINE_SIZE},
    reassembly::{BodyOutcome, Reassembler},
    record::{LineParser, RecordSink},
};

/// Name of the protocol-compatibility version header attached to responses.
pub const VERSION_HEADER_NAME: &str = "X-Influxdb-Version";

/// Value advertised in the version header.
pub const VERSION_HEADER_VALUE: &str = "1.0";

const JSON_CONTENT_TYPE: &str = "application/json";
const QUERY_STUB: &[u8] = b"{\"results\":[]}";

/// Declared encoding of a request body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContentEncoding {
    /// Plain, uncompressed body.
    #[default]
    Identity,
    /// Gzip-compressed body.
    Gzip,
}

impl ContentEncoding {
    /// Interpret a `Content-Encoding` header value. Anything other than
    /// `gzip` is treated as a plain body.
    #[must_use]
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some("gzip") => Self::Gzip,
            _ => Self::Identity,
        }
    }
}

/// Transport-agnostic view of one inbound request.
#[derive(Debug)]
pub struct Request<B> {
    /// Request path, e.g. `/write`.
    pub path: String,
    /// Declared body length, when the transport knows it.
    pub content_length: Option<u64>,
    /// Declared body encoding.
    pub content_encoding: ContentEncoding,
    /// The body stream.
    pub body: B,
}

/// Response status codes produced by the handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// 200: query acknowledgement.
    Ok,
    /// 204: write accepted, liveness probe.
    NoContent,
    /// 400: rejected records or an unreadable body.
    BadRequest,
    /// 404: unknown route.
    NotFound,
    /// 413: declared body length over the configured maximum.
    PayloadTooLarge,
}

impl Status {
    /// Numeric HTTP status code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::NoContent => 204,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::PayloadTooLarge => 413,
        }
    }
}

/// Minimal response surface handed back to the embedding server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// Response status.
    pub status: Status,
    /// Content type of `body`, when a body is present.
    pub content_type: Option<&'static str>,
    /// Response payload; empty for no-content responses.
    pub body: Bytes,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl Response {
    fn no_content() -> Self {
        Self {
            status: Status::NoContent,
            content_type: None,
            body: Bytes::new(),
        }
    }

    fn query_stub() -> Self {
        Self {
            status: Status::Ok,
            content_type: Some(JSON_CONTENT_TYPE),
            body: Bytes::from_static(QUERY_STUB),
        }
    }

    fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            content_type: Some("text/plain; charset=utf-8"),
            body: Bytes::from_static(b"404 page not found\n"),
        }
    }

    fn error(status: Status, message: &str) -> Self {
        let body = serde_json::to_vec(&ErrorBody { error: message })
            .map_or_else(|_| Bytes::from_static(b"{\"error\":\"internal\"}"), Bytes::from);
        Self {
            status,
            content_type: Some(JSON_CONTENT_TYPE),
            body,
        }
    }
}

/// The per-service ingestion boundary: routes requests and drives the
/// reassembler for the write path.
pub struct IngestHandler<P, S> {
    reassembler: Reassembler<P, S>,
    max_body_size: u64,
}

impl<P, S> IngestHandler<P, S>
where
    P: LineParser,
    S: RecordSink,
{
    /// Build a handler from a normalized `config`, a shared pool and the
    /// parser/sink collaborators.
    #[must_use]
    pub fn new(config: &ListenerConfig, pool: Arc<BufferPool>, parser: P, sink: S) -> Self {
        let config = config.clone().normalized();
        Self {
            reassembler: Reassembler::new(pool, parser, sink),
            max_body_size: config.max_body_size,
        }
    }

    /// Dispatch one request to its route.
    pub async fn handle<B>(&self, request: Request<B>) -> Response
    where
        B: AsyncRead + Unpin,
    {
        match request.path.as_str() {
            "/write" => self.serve_write(request).await,
            "/query" => Response::query_stub(),
            "/ping" => Response::no_content(),
            _ => Response::not_found(),
        }
    }

    /// Ingest a write body: enforce the size ceiling, attach the adapters
    /// and map the drain outcome to a response.
    async fn serve_write<B>(&self, request: Request<B>) -> Response
    where
        B: AsyncRead + Unpin,
    {
        if let Some(declared) = request.content_length
            && declared > self.max_body_size
        {
            let err = IngestError::RequestTooLarge {
                declared,
                limit: self.max_body_size,
            };
            error!("{err}");
            return Response::error(Status::PayloadTooLarge, "request body too large");
        }

        let size_hint = match (request.content_encoding, request.content_length) {
            (ContentEncoding::Identity, Some(declared)) => usize::try_from(declared)
                .unwrap_or(MAX_LINE_SIZE)
                .min(MAX_LINE_SIZE),
            // Compressed or unknown-length bodies get the large class.
            _ => MAX_LINE_SIZE,
        };

        // The limit applies to the bytes the reassembler sees, so it wraps
        // the decompressed stream, not the wire stream.
        let outcome = match request.content_encoding {
            ContentEncoding::Gzip => {
                let body = LimitedBody::new(GzipBody::new(request.body), self.max_body_size);
                self.reassembler.drain(body, size_hint).await
            }
            ContentEncoding::Identity => {
                let body = LimitedBody::new(request.body, self.max_body_size);
                self.reassembler.drain(body, size_hint).await
            }
        };

        match outcome {
            Ok(BodyOutcome::Accepted) => Response::no_content(),
            Ok(BodyOutcome::Rejected) => {
                Response::error(Status::BadRequest, "unable to accept all records")
            }
            Err(err) => {
                let err = classify_read_error(err);
                error!("{err}");
                Response::error(Status::BadRequest, &err.to_string())
            }
        }
    }
}

/// Sort a failed body read into the taxonomy: decoder rejections surface as
/// malformed bodies, everything else as a stream failure.
fn classify_read_error(err: io::Error) -> IngestError {
    match err.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => IngestError::MalformedBody(err),
        _ => IngestError::Io(err),
    }
}
