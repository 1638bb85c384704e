//! Record data model and the parser/sink seams.
//!
//! The engine itself never interprets line contents. A [`LineParser`] turns a
//! dispatched byte span into structured [`Record`]s and a [`RecordSink`]
//! accumulates them; both are supplied by the embedding service.

use std::collections::BTreeMap;

use thiserror::Error;

/// A single field value carried by a record.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// 64-bit floating point field.
    Float(f64),
    /// Signed integer field.
    Integer(i64),
    /// Unsigned integer field.
    UnsignedInteger(u64),
    /// Boolean field.
    Boolean(bool),
    /// String field.
    Text(String),
}

/// One complete unit of the line-delimited protocol.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Measurement or series name.
    pub name: String,
    /// Key/value tags attached to the record.
    pub tags: BTreeMap<String, String>,
    /// Field set; at least one entry for a well-formed record.
    pub fields: BTreeMap<String, FieldValue>,
    /// Nanoseconds since the Unix epoch, when the line carried a timestamp.
    pub timestamp: Option<i64>,
}

/// Rejection raised by a [`LineParser`] for a span it cannot interpret.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unable to parse line protocol: {0}")]
pub struct ParseError(pub String);

/// Parses spans of the line protocol into records.
///
/// A span holds zero or more delimiter-separated lines. The final span of a
/// body may lack a trailing delimiter, and an empty body dispatches a single
/// zero-length span: implementations must yield zero records for an empty
/// span rather than an error.
pub trait LineParser: Send + Sync {
    /// Parse every line in `input`.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when any line in the span is malformed. A
    /// rejected span contributes no records.
    fn parse(&self, input: &[u8]) -> Result<Vec<Record>, ParseError>;
}

/// Receives parsed records, in stream order within one request.
///
/// May be invoked many times per request, concurrently across requests.
pub trait RecordSink: Send + Sync {
    /// Accept one record.
    fn add_record(&self, record: Record);
}
