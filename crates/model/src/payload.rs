//! Collector payloads and the decoder seam
//!
//! The production payload decoder is an external collaborator; the pipeline
//! only depends on the [`PayloadDecoder`] trait. The [`JsonPayloadDecoder`]
//! shipped here decodes the self-describing JSON body used by `sluice send`
//! and the test suite.

use std::fmt;

use serde_json::{Map, Value};

/// Decoded form of one raw collector record.
///
/// A single payload may carry any number of logical events; each event is a
/// flat name-to-value parameter map in tracker-protocol terms.
#[derive(Debug, Clone, Default)]
pub struct CollectorPayload {
    /// Logical events, in payload order.
    pub events: Vec<Map<String, Value>>,
    /// Collector-side receive time, epoch milliseconds.
    pub collector_tstamp: Option<i64>,
    /// Client address as seen by the collector.
    pub source_ip: Option<String>,
    /// User agent header captured by the collector.
    pub useragent: Option<String>,
    /// Raw request headers, `Name: value` form.
    pub headers: Vec<String>,
}

/// Why a raw record could not be decoded.
#[derive(Debug, Clone)]
pub struct DecodeFailure {
    pub messages: Vec<String>,
}

impl DecodeFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages.join("; "))
    }
}

impl std::error::Error for DecodeFailure {}

/// Decodes raw collector bytes into a structured payload.
///
/// `Ok(None)` means the record was well-formed but carried nothing to
/// enrich (an empty payload); it is not an error.
pub trait PayloadDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Option<CollectorPayload>, DecodeFailure>;
}

/// Schema URI accepted by the reference decoder.
const PAYLOAD_SCHEMA_PREFIX: &str = "iglu:com.sluice/collector_payload/jsonschema/1-";

/// Reference decoder for the self-describing JSON payload body:
///
/// ```json
/// {
///   "schema": "iglu:com.sluice/collector_payload/jsonschema/1-0-0",
///   "data": {
///     "collector_tstamp": 1700000000000,
///     "source_ip": "203.0.113.9",
///     "useragent": "Mozilla/5.0 ...",
///     "headers": ["Accept: */*"],
///     "events": [{"e": "pv", "aid": "shop", "url": "https://..."}]
///   }
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonPayloadDecoder;

impl PayloadDecoder for JsonPayloadDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Option<CollectorPayload>, DecodeFailure> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| DecodeFailure::new(format!("payload is not valid UTF-8: {e}")))?;

        let value: Value = serde_json::from_str(text)
            .map_err(|e| DecodeFailure::new(format!("payload is not valid JSON: {e}")))?;

        let obj = value
            .as_object()
            .ok_or_else(|| DecodeFailure::new("payload root is not a JSON object"))?;

        let schema = obj
            .get("schema")
            .and_then(Value::as_str)
            .ok_or_else(|| DecodeFailure::new("payload is missing the schema field"))?;

        if !schema.starts_with(PAYLOAD_SCHEMA_PREFIX) {
            return Err(DecodeFailure::new(format!(
                "unexpected payload schema: {schema}"
            )));
        }

        let data = match obj.get("data") {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Object(data)) => data,
            Some(_) => return Err(DecodeFailure::new("payload data is not a JSON object")),
        };

        let mut failures = Vec::new();

        let events = match data.get("events") {
            None => Vec::new(),
            Some(Value::Array(items)) => {
                let mut events = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Value::Object(map) => events.push(map.clone()),
                        other => failures.push(format!(
                            "event {i} is not a JSON object (found {})",
                            type_name(other)
                        )),
                    }
                }
                events
            }
            Some(other) => {
                failures.push(format!(
                    "events is not a JSON array (found {})",
                    type_name(other)
                ));
                Vec::new()
            }
        };

        if !failures.is_empty() {
            return Err(DecodeFailure { messages: failures });
        }

        let headers = data
            .get("headers")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(CollectorPayload {
            events,
            collector_tstamp: data.get("collector_tstamp").and_then(Value::as_i64),
            source_ip: data
                .get("source_ip")
                .and_then(Value::as_str)
                .map(str::to_owned),
            useragent: data
                .get("useragent")
                .and_then(Value::as_str)
                .map(str::to_owned),
            headers,
        }))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(body: &str) -> Result<Option<CollectorPayload>, DecodeFailure> {
        JsonPayloadDecoder.decode(body.as_bytes())
    }

    #[test]
    fn decodes_a_two_event_payload() {
        let payload = decode(
            r#"{
                "schema": "iglu:com.sluice/collector_payload/jsonschema/1-0-0",
                "data": {
                    "collector_tstamp": 1700000000000,
                    "source_ip": "203.0.113.9",
                    "useragent": "test-agent",
                    "headers": ["Accept: */*"],
                    "events": [{"e": "pv"}, {"e": "se"}]
                }
            }"#,
        )
        .unwrap()
        .expect("payload present");

        assert_eq!(payload.events.len(), 2);
        assert_eq!(payload.collector_tstamp, Some(1_700_000_000_000));
        assert_eq!(payload.source_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(payload.headers, vec!["Accept: */*".to_string()]);
    }

    #[test]
    fn null_data_is_an_empty_payload_not_an_error() {
        let decoded = decode(
            r#"{"schema": "iglu:com.sluice/collector_payload/jsonschema/1-0-0", "data": null}"#,
        )
        .unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn garbage_bytes_fail_with_a_reason() {
        let err = JsonPayloadDecoder
            .decode(&[0x00, 0x01, 0x02])
            .unwrap_err();
        assert!(err.messages[0].contains("UTF-8"), "{err}");
    }

    #[test]
    fn wrong_schema_is_rejected() {
        let err = decode(r#"{"schema": "iglu:com.other/thing/jsonschema/1-0-0", "data": {}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unexpected payload schema"));
    }

    #[test]
    fn non_object_event_is_rejected() {
        let err = decode(
            r#"{
                "schema": "iglu:com.sluice/collector_payload/jsonschema/1-0-0",
                "data": {"events": [{"e": "pv"}, 42]}
            }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("event 1 is not a JSON object"));
    }
}
