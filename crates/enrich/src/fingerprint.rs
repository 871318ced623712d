//! Event fingerprint enrichment
//!
//! SHA-256 over a configured set of canonical fields, written to
//! `event_fingerprint`. Downstream consumers use it for deduplication and
//! as a partition key.

use sha2::{Digest, Sha256};
use sluice_model::EnrichedEvent;

use crate::{EnrichError, Enrichment, EnrichmentResult};

#[derive(Debug)]
pub struct EventFingerprintEnrichment {
    fields: Vec<String>,
}

impl EventFingerprintEnrichment {
    pub fn new(fields: Vec<String>) -> Result<Self, EnrichError> {
        for field in &fields {
            if !EnrichedEvent::FIELD_NAMES.contains(&field.as_str()) {
                return Err(EnrichError::config(format!(
                    "event_fingerprint: {field} is not a canonical field"
                )));
            }
        }
        Ok(Self { fields })
    }
}

impl Enrichment for EventFingerprintEnrichment {
    fn name(&self) -> &'static str {
        "event_fingerprint"
    }

    fn apply(&self, event: &mut EnrichedEvent) -> EnrichmentResult {
        let mut hasher = Sha256::new();
        for field in &self.fields {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
            if let Some(value) = event.get(field) {
                hasher.update(value.as_bytes());
            }
            hasher.update([0u8]);
        }

        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        event.event_fingerprint = Some(hex);

        EnrichmentResult::ok()
    }
}
