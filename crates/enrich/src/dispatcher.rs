//! Per-payload dispatcher
//!
//! Drives one raw record end to end: decode, map each logical event to a
//! base enriched event, run the enrichment chain against one registry
//! snapshot, gate on the record size ceiling, derive pii events. Never
//! returns an error and never panics outward - every per-record problem
//! becomes a bad row, and an escaped panic becomes a `generic_error` bad
//! row plus an exception report.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sluice_metrics::SharedExceptionReporter;
use sluice_model::{
    BadRow, BadRowKind, CollectorPayload, EnrichedEvent, Outcome, PayloadDecoder, Processor,
};
use tracing::debug;
use uuid::Uuid;

use crate::{PiiExtractor, SchemaClient, SchemaKey, SharedRegistry};

/// Everything one raw record produced.
#[derive(Debug, Default)]
pub struct DispatchResult {
    /// Good events and bad rows, in payload order.
    pub outcomes: Vec<Outcome>,

    /// Derived pii events, one per good event that carried pii values.
    pub pii_events: Vec<EnrichedEvent>,

    /// Collector-to-enrich latency, when the payload carried a collector
    /// timestamp.
    pub latency_ms: Option<u64>,
}

pub struct Dispatcher {
    decoder: Arc<dyn PayloadDecoder>,
    registry: SharedRegistry,
    schema: Arc<dyn SchemaClient>,
    pii: Option<PiiExtractor>,
    exception: SharedExceptionReporter,
    processor: Processor,
    record_byte_limit: usize,
}

impl Dispatcher {
    pub fn new(
        decoder: Arc<dyn PayloadDecoder>,
        registry: SharedRegistry,
        schema: Arc<dyn SchemaClient>,
        pii: Option<PiiExtractor>,
        exception: SharedExceptionReporter,
        processor: Processor,
        record_byte_limit: usize,
    ) -> Self {
        Self {
            decoder,
            registry,
            schema,
            pii,
            exception,
            processor,
            record_byte_limit,
        }
    }

    /// Enrich one raw record. Infallible by contract.
    pub fn dispatch(&self, bytes: &[u8]) -> DispatchResult {
        match catch_unwind(AssertUnwindSafe(|| self.dispatch_inner(bytes))) {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(&panic);
                self.exception
                    .report(&format!("enrichment panicked: {message}"));
                DispatchResult {
                    outcomes: vec![Outcome::Bad(BadRow::from_bytes(
                        BadRowKind::GenericError,
                        self.processor.clone(),
                        bytes,
                        vec![message],
                    ))],
                    ..Default::default()
                }
            }
        }
    }

    fn dispatch_inner(&self, bytes: &[u8]) -> DispatchResult {
        // 1. Decode. A decode failure fails the whole record.
        let payload = match self.decoder.decode(bytes) {
            Ok(Some(payload)) => payload,
            Ok(None) => return DispatchResult::default(),
            Err(failure) => {
                return DispatchResult {
                    outcomes: vec![Outcome::Bad(BadRow::from_bytes(
                        BadRowKind::CpformatViolation,
                        self.processor.clone(),
                        bytes,
                        failure.messages,
                    ))],
                    ..Default::default()
                }
            }
        };

        // 2. One ETL timestamp for every event of this record.
        let etl = Utc::now();

        // 3. One registry snapshot for every event of this record.
        let registry = self.registry.load_full();

        let mut result = DispatchResult::default();

        for params in &payload.events {
            let mut event = self.base_event(&payload, params, etl);

            // Self-describing documents are validated before enrichment.
            if let Err(messages) = self.validate_self_describing(&event) {
                result.outcomes.push(Outcome::Bad(BadRow::from_bytes(
                    BadRowKind::SchemaViolation,
                    self.processor.clone(),
                    bytes,
                    messages,
                )));
                continue;
            }

            // 4. Run the chain; aggregate every failure for this event
            // into one bad row.
            let mut contexts = Vec::new();
            let mut failures = Vec::new();
            for enrichment in registry.enrichments() {
                let outcome = enrichment.apply(&mut event);
                contexts.extend(outcome.contexts);
                failures.extend(
                    outcome
                        .failures
                        .into_iter()
                        .map(|f| format!("{}: {f}", enrichment.name())),
                );
            }

            if !failures.is_empty() {
                result.outcomes.push(Outcome::Bad(BadRow::from_bytes(
                    BadRowKind::EnrichmentFailure,
                    self.processor.clone(),
                    bytes,
                    failures,
                )));
                continue;
            }

            if !contexts.is_empty() {
                event.derived_contexts = Some(Value::Array(contexts).to_string());
            }

            // 5. Size gate: an oversized event must never reach the good
            // output.
            let serialized = event.to_tsv();
            if serialized.len() > self.record_byte_limit {
                let sample: String = serialized
                    .chars()
                    .take(self.record_byte_limit / 10)
                    .collect();
                debug!(
                    bytes = serialized.len(),
                    limit = self.record_byte_limit,
                    "event demoted to size violation"
                );
                result.outcomes.push(Outcome::Bad(BadRow::new(
                    BadRowKind::SizeViolation,
                    self.processor.clone(),
                    sample,
                    vec![format!(
                        "serialized event of {} bytes exceeds the {} byte limit",
                        serialized.len(),
                        self.record_byte_limit
                    )],
                )));
                continue;
            }

            // 6. Derive the pii event before the good event is moved out.
            if let Some(extractor) = &self.pii {
                if let Some(pii_event) = extractor.extract(&event) {
                    result.pii_events.push(pii_event);
                }
            }

            result.outcomes.push(Outcome::Good(Box::new(event)));
        }

        // 7. Latency against the collector clock.
        if let Some(collector_ms) = payload.collector_tstamp {
            let now_ms = etl.timestamp_millis();
            result.latency_ms = Some(now_ms.saturating_sub(collector_ms).max(0) as u64);
        }

        result
    }

    /// Map one logical event's tracker parameters onto a base enriched
    /// event, together with the payload-level context.
    fn base_event(
        &self,
        payload: &CollectorPayload,
        params: &serde_json::Map<String, Value>,
        etl: DateTime<Utc>,
    ) -> EnrichedEvent {
        let mut event = EnrichedEvent::default();

        event.etl_tstamp = Some(format_tstamp_millis(etl.timestamp_millis()));
        event.v_etl = Some(format!("{}-{}", self.processor.name, self.processor.version));
        if let Some(collector_ms) = payload.collector_tstamp {
            event.collector_tstamp = Some(format_tstamp_millis(collector_ms));
        }
        event.user_ipaddress = payload.source_ip.clone();
        event.useragent = payload.useragent.clone();

        let str_param = |key: &str| params.get(key).and_then(Value::as_str).map(str::to_owned);

        event.event_id = str_param("eid")
            .filter(|eid| Uuid::parse_str(eid).is_ok())
            .or_else(|| Some(Uuid::new_v4().to_string()));

        event.event = str_param("e").map(|code| expand_event_code(&code));
        event.app_id = str_param("aid");
        event.platform = str_param("p");
        event.txn_id = str_param("tid");
        event.name_tracker = str_param("tna");
        event.v_tracker = str_param("tv");
        event.user_id = str_param("uid");
        event.domain_userid = str_param("duid");
        event.domain_sessionidx = str_param("vid");
        event.domain_sessionid = str_param("sid");
        event.network_userid = str_param("nuid").or_else(|| str_param("tnuid"));
        event.user_fingerprint = str_param("fp");
        event.page_title = str_param("page");
        event.page_referrer = str_param("refr");
        event.br_lang = str_param("lang");
        event.br_colordepth = str_param("cd");
        event.doc_charset = str_param("cs");
        event.os_timezone = str_param("tz");
        event.se_category = str_param("se_ca");
        event.se_action = str_param("se_ac");
        event.se_label = str_param("se_la");
        event.se_property = str_param("se_pr");
        event.se_value = str_param("se_va");
        event.contexts = str_param("co");
        event.unstruct_event = str_param("ue_pr");

        if let Some(ua) = str_param("ua") {
            event.useragent = Some(ua);
        }

        for (param, field) in [("dtm", "dvce_created_tstamp"), ("stm", "dvce_sent_tstamp"), ("ttm", "true_tstamp")] {
            if let Some(millis) = params.get(param).and_then(value_as_millis) {
                event.set(field, format_tstamp_millis(millis));
            }
        }

        if let Some(res) = str_param("res") {
            if let Some((w, h)) = res.split_once('x') {
                event.dvce_screenwidth = Some(w.to_string());
                event.dvce_screenheight = Some(h.to_string());
            }
        }
        if let Some(vp) = str_param("vp") {
            if let Some((w, h)) = vp.split_once('x') {
                event.br_viewwidth = Some(w.to_string());
                event.br_viewheight = Some(h.to_string());
            }
        }

        if let Some(page_url) = str_param("url") {
            if let Ok(url) = url::Url::parse(&page_url) {
                event.page_urlscheme = Some(url.scheme().to_string());
                event.page_urlhost = url.host_str().map(str::to_owned);
                event.page_urlport = url
                    .port_or_known_default()
                    .map(|port| port.to_string());
                event.page_urlpath = Some(url.path().to_string());
                event.page_urlquery = url.query().map(str::to_owned);
                event.page_urlfragment = url.fragment().map(str::to_owned);
            }
            event.page_url = Some(page_url);
        }

        event
    }

    /// Validate the self-describing documents an event carries (custom
    /// contexts and the self-describing event body).
    fn validate_self_describing(&self, event: &EnrichedEvent) -> Result<(), Vec<String>> {
        let mut messages = Vec::new();

        if let Some(unstruct) = event.unstruct_event.as_deref() {
            self.validate_document(unstruct, "unstruct event", &mut messages);
        }
        if let Some(contexts) = event.contexts.as_deref() {
            self.validate_document(contexts, "contexts", &mut messages);
        }

        if messages.is_empty() {
            Ok(())
        } else {
            Err(messages)
        }
    }

    fn validate_document(&self, raw: &str, what: &str, messages: &mut Vec<String>) {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                messages.push(format!("{what} is not valid JSON: {e}"));
                return;
            }
        };

        self.validate_wrapper(&value, what, messages);
    }

    fn validate_wrapper(&self, value: &Value, what: &str, messages: &mut Vec<String>) {
        let Some(obj) = value.as_object() else {
            messages.push(format!("{what} is not a self-describing object"));
            return;
        };
        let Some(schema_uri) = obj.get("schema").and_then(Value::as_str) else {
            messages.push(format!("{what} is missing its schema field"));
            return;
        };
        let key = match SchemaKey::parse(schema_uri) {
            Ok(key) => key,
            Err(reason) => {
                messages.push(format!("{what}: {reason}"));
                return;
            }
        };
        let data = obj.get("data").unwrap_or(&Value::Null);

        // A contexts wrapper holds an array of self-describing documents;
        // validate each element on its own.
        if let Some(items) = data.as_array() {
            if key.name.contains("contexts") {
                for (i, item) in items.iter().enumerate() {
                    self.validate_wrapper(item, &format!("{what}[{i}]"), messages);
                }
                return;
            }
        }

        if let Err(found) = self.schema.validate(data, &key) {
            messages.extend(found.into_iter().map(|m| format!("{what}: {m}")));
        }
    }
}

/// Render epoch milliseconds in the canonical timestamp format.
fn format_tstamp_millis(millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => millis.to_string(),
    }
}

/// Accept timestamps both as JSON numbers and numeric strings.
fn value_as_millis(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Expand tracker-protocol event codes to canonical event names.
fn expand_event_code(code: &str) -> String {
    match code {
        "pv" => "page_view",
        "pp" => "page_ping",
        "tr" => "transaction",
        "ti" => "transaction_item",
        "se" => "struct",
        "ue" => "unstruct",
        other => other,
    }
    .to_string()
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod tests;
