//! Bad rows
//!
//! Every per-record failure in the pipeline becomes a bad row: a tagged,
//! self-contained record carrying the failing payload, the processor that
//! rejected it, and the reasons why. Bad rows are never dropped; they go to
//! the bad output as single-line compact JSON.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Failure taxonomy for bad rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BadRowKind {
    /// The raw bytes could not be decoded into a collector payload.
    CpformatViolation,
    /// A self-describing JSON failed schema validation.
    SchemaViolation,
    /// One or more enrichments failed for an event.
    EnrichmentFailure,
    /// The serialized event exceeded the record size ceiling.
    SizeViolation,
    /// An unexpected error escaped the enrichment chain.
    GenericError,
}

/// Identifies the program (name and version) that produced a bad row.
#[derive(Debug, Clone, Serialize)]
pub struct Processor {
    pub name: String,
    pub version: String,
}

impl Processor {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// A structured failure record.
#[derive(Debug, Clone, Serialize)]
pub struct BadRow {
    pub kind: BadRowKind,
    /// Base64 of the original payload, or a truncated event sample for
    /// size violations.
    pub payload: String,
    pub processor: Processor,
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<String>,
}

impl BadRow {
    /// Build a bad row with an already-rendered payload sample.
    pub fn new(
        kind: BadRowKind,
        processor: Processor,
        payload: impl Into<String>,
        messages: Vec<String>,
    ) -> Self {
        Self {
            kind,
            payload: payload.into(),
            processor,
            timestamp: Utc::now(),
            messages,
        }
    }

    /// Build a bad row carrying the base64-encoded original bytes.
    pub fn from_bytes(
        kind: BadRowKind,
        processor: Processor,
        payload: &[u8],
        messages: Vec<String>,
    ) -> Self {
        Self::new(kind, processor, BASE64.encode(payload), messages)
    }

    /// Serialize to one compact JSON line.
    ///
    /// Serialization of this shape cannot realistically fail; if it ever
    /// does, a minimal hand-built line is emitted instead so the record is
    /// still not lost.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                "{{\"kind\":\"generic_error\",\"payload\":\"\",\"messages\":[\"bad row serialization failed: {}\"]}}",
                e
            )
        })
    }
}
