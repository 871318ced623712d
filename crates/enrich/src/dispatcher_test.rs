use std::sync::{Arc, Mutex};

use sluice_metrics::ExceptionReporter;
use sluice_model::{
    BadRowKind, EnrichedEvent, JsonPayloadDecoder, Outcome, Processor,
};

use crate::{
    shared, Dispatcher, Enrichment, EnrichmentRegistry, EnrichmentResult,
    PermissiveSchemaClient, PiiExtractor, SharedRegistry,
};

#[derive(Default)]
struct RecordingReporter {
    reports: Mutex<Vec<String>>,
}

impl ExceptionReporter for RecordingReporter {
    fn report(&self, error: &str) {
        self.reports.lock().unwrap().push(error.to_string());
    }
}

/// Fails any event whose se_label is "boom".
struct BoomEnrichment;

impl Enrichment for BoomEnrichment {
    fn name(&self) -> &'static str {
        "boom"
    }

    fn apply(&self, event: &mut EnrichedEvent) -> EnrichmentResult {
        if event.se_label.as_deref() == Some("boom") {
            EnrichmentResult::failure("label said boom")
        } else {
            EnrichmentResult::ok()
        }
    }
}

/// Inflates page_title so the serialized event exceeds any small limit.
struct InflateEnrichment {
    bytes: usize,
}

impl Enrichment for InflateEnrichment {
    fn name(&self) -> &'static str {
        "inflate"
    }

    fn apply(&self, event: &mut EnrichedEvent) -> EnrichmentResult {
        event.page_title = Some("x".repeat(self.bytes));
        EnrichmentResult::ok()
    }
}

struct PanicEnrichment;

impl Enrichment for PanicEnrichment {
    fn name(&self) -> &'static str {
        "panic"
    }

    fn apply(&self, _event: &mut EnrichedEvent) -> EnrichmentResult {
        panic!("boom from inside the chain");
    }
}

/// Attaches one derived context.
struct ContextEnrichment;

impl Enrichment for ContextEnrichment {
    fn name(&self) -> &'static str {
        "context"
    }

    fn apply(&self, _event: &mut EnrichedEvent) -> EnrichmentResult {
        EnrichmentResult {
            contexts: vec![serde_json::json!({
                "schema": "iglu:com.sluice/derived/jsonschema/1-0-0",
                "data": {"marker": true}
            })],
            failures: Vec::new(),
        }
    }
}

struct Fixture {
    dispatcher: Dispatcher,
    reporter: Arc<RecordingReporter>,
}

fn fixture_with(
    registry: SharedRegistry,
    pii: Option<PiiExtractor>,
    record_byte_limit: usize,
) -> Fixture {
    let reporter = Arc::new(RecordingReporter::default());
    let dispatcher = Dispatcher::new(
        Arc::new(JsonPayloadDecoder),
        registry,
        Arc::new(PermissiveSchemaClient),
        pii,
        reporter.clone(),
        Processor::new("sluice-test", "0.0.0"),
        record_byte_limit,
    );
    Fixture {
        dispatcher,
        reporter,
    }
}

fn fixture(enrichments: Vec<Arc<dyn Enrichment>>) -> Fixture {
    fixture_with(
        shared(EnrichmentRegistry::from_enrichments(enrichments)),
        None,
        6_900_000,
    )
}

fn payload(events_json: &str) -> Vec<u8> {
    format!(
        r#"{{
            "schema": "iglu:com.sluice/collector_payload/jsonschema/1-0-0",
            "data": {{
                "collector_tstamp": 1700000000000,
                "source_ip": "81.2.69.142",
                "useragent": "test-agent",
                "events": {events_json}
            }}
        }}"#
    )
    .into_bytes()
}

#[test]
fn plain_payload_yields_one_good_row() {
    let f = fixture(Vec::new());
    let result = f
        .dispatcher
        .dispatch(&payload(r#"[{"e": "pv", "aid": "shop", "p": "web"}]"#));

    assert_eq!(result.outcomes.len(), 1);
    let Outcome::Good(event) = &result.outcomes[0] else {
        panic!("expected a good outcome, got {:?}", result.outcomes[0]);
    };
    assert_eq!(event.app_id.as_deref(), Some("shop"));
    assert_eq!(event.event.as_deref(), Some("page_view"));
    assert_eq!(event.user_ipaddress.as_deref(), Some("81.2.69.142"));
    assert!(event.event_id.is_some());
    assert!(event.etl_tstamp.is_some());
    assert!(result.pii_events.is_empty());
    assert!(result.latency_ms.is_some());
}

#[test]
fn malformed_bytes_yield_one_cpformat_violation() {
    let f = fixture(Vec::new());
    let result = f.dispatcher.dispatch(&[0x00, 0x01, 0x02]);

    assert_eq!(result.outcomes.len(), 1);
    let Outcome::Bad(row) = &result.outcomes[0] else {
        panic!("expected a bad outcome");
    };
    assert_eq!(row.kind, BadRowKind::CpformatViolation);
    assert_eq!(row.payload, "AAEC", "payload field is base64 of the bytes");
    assert!(result.pii_events.is_empty());
}

#[test]
fn empty_payload_yields_nothing() {
    let f = fixture(Vec::new());
    let body =
        br#"{"schema": "iglu:com.sluice/collector_payload/jsonschema/1-0-0", "data": null}"#;
    let result = f.dispatcher.dispatch(body);
    assert!(result.outcomes.is_empty());
}

#[test]
fn batched_payload_with_one_failing_event_splits_good_and_bad() {
    let f = fixture(vec![Arc::new(BoomEnrichment)]);
    let result = f.dispatcher.dispatch(&payload(
        r#"[{"e": "pv", "aid": "shop"}, {"e": "se", "se_la": "boom"}]"#,
    ));

    assert_eq!(result.outcomes.len(), 2);
    assert!(result.outcomes[0].is_good());
    let Outcome::Bad(row) = &result.outcomes[1] else {
        panic!("expected the second event to fail");
    };
    assert_eq!(row.kind, BadRowKind::EnrichmentFailure);
    assert_eq!(row.messages, vec!["boom: label said boom".to_string()]);
}

#[test]
fn oversized_event_is_demoted_to_size_violation() {
    let limit = 10_000;
    let f = fixture_with(
        shared(EnrichmentRegistry::from_enrichments(vec![Arc::new(
            InflateEnrichment { bytes: limit * 2 },
        )])),
        None,
        limit,
    );

    let result = f.dispatcher.dispatch(&payload(r#"[{"e": "pv"}]"#));

    assert_eq!(result.outcomes.len(), 1);
    let Outcome::Bad(row) = &result.outcomes[0] else {
        panic!("expected a size violation");
    };
    assert_eq!(row.kind, BadRowKind::SizeViolation);
    assert!(row.payload.chars().count() <= limit / 10);
    assert!(row.messages[0].contains("exceeds"));
}

#[test]
fn panicking_enrichment_becomes_generic_error_and_is_reported() {
    let f = fixture(vec![Arc::new(PanicEnrichment)]);
    let result = f.dispatcher.dispatch(&payload(r#"[{"e": "pv"}]"#));

    assert_eq!(result.outcomes.len(), 1);
    let Outcome::Bad(row) = &result.outcomes[0] else {
        panic!("expected a bad outcome");
    };
    assert_eq!(row.kind, BadRowKind::GenericError);
    assert!(row.messages[0].contains("boom from inside the chain"));

    let reports = f.reporter.reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("panicked"));
}

#[test]
fn invalid_unstruct_event_is_a_schema_violation() {
    let f = fixture(Vec::new());
    let result = f
        .dispatcher
        .dispatch(&payload(r#"[{"e": "ue", "ue_pr": "{not json"}]"#));

    assert_eq!(result.outcomes.len(), 1);
    let Outcome::Bad(row) = &result.outcomes[0] else {
        panic!("expected a schema violation");
    };
    assert_eq!(row.kind, BadRowKind::SchemaViolation);
    assert!(row.messages[0].contains("not valid JSON"));
}

#[test]
fn well_formed_unstruct_event_passes_validation() {
    let f = fixture(Vec::new());
    let ue = r#"{\"schema\": \"iglu:com.acme/click/jsonschema/1-0-0\", \"data\": {\"x\": 1}}"#;
    let result = f
        .dispatcher
        .dispatch(&payload(&format!(r#"[{{"e": "ue", "ue_pr": "{ue}"}}]"#)));

    assert_eq!(result.outcomes.len(), 1);
    assert!(result.outcomes[0].is_good());
}

#[test]
fn pii_fields_split_into_a_derived_event() {
    let f = fixture_with(
        shared(EnrichmentRegistry::empty()),
        Some(PiiExtractor::new(vec!["user_id".into()])),
        6_900_000,
    );

    let result = f
        .dispatcher
        .dispatch(&payload(r#"[{"e": "pv", "uid": "alice@example.com"}]"#));

    assert_eq!(result.outcomes.len(), 1);
    assert!(result.outcomes[0].is_good());
    assert_eq!(result.pii_events.len(), 1);
    assert_eq!(
        result.pii_events[0].user_id.as_deref(),
        Some("alice@example.com")
    );
}

#[test]
fn derived_contexts_are_attached_to_the_good_event() {
    let f = fixture(vec![Arc::new(ContextEnrichment)]);
    let result = f.dispatcher.dispatch(&payload(r#"[{"e": "pv"}]"#));

    let Outcome::Good(event) = &result.outcomes[0] else {
        panic!("expected a good outcome");
    };
    let derived = event.derived_contexts.as_deref().expect("derived contexts");
    assert!(derived.contains("\"marker\":true"));
}

#[test]
fn page_url_components_are_extracted() {
    let f = fixture(Vec::new());
    let result = f.dispatcher.dispatch(&payload(
        r#"[{"e": "pv", "url": "https://shop.example.com:8443/a/b?q=1#frag"}]"#,
    ));

    let Outcome::Good(event) = &result.outcomes[0] else {
        panic!("expected a good outcome");
    };
    assert_eq!(event.page_urlscheme.as_deref(), Some("https"));
    assert_eq!(event.page_urlhost.as_deref(), Some("shop.example.com"));
    assert_eq!(event.page_urlport.as_deref(), Some("8443"));
    assert_eq!(event.page_urlpath.as_deref(), Some("/a/b"));
    assert_eq!(event.page_urlquery.as_deref(), Some("q=1"));
    assert_eq!(event.page_urlfragment.as_deref(), Some("frag"));
}
