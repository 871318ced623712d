//! Pii extraction
//!
//! Splits the configured personally-identifying fields out of a good event
//! into a derived pii event. The canonical extraction rule lives with the
//! pii enrichment configuration; this collaborator applies it: zero-or-one
//! derived event per good event, carrying only the flagged fields plus the
//! identity triple (`event_id`, `platform`, `etl_tstamp`) that lets the
//! pii stream be joined back.

use sluice_config::EnrichmentConfig;
use sluice_model::EnrichedEvent;

#[derive(Debug, Clone)]
pub struct PiiExtractor {
    fields: Vec<String>,
}

impl PiiExtractor {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// Build from the enrichment list, if pii pseudonymization is
    /// configured. Field validity is enforced by config validation.
    pub fn from_configs(configs: &[EnrichmentConfig]) -> Option<Self> {
        configs.iter().find_map(|config| match config {
            EnrichmentConfig::PiiPseudonymization { fields } => {
                Some(Self::new(fields.clone()))
            }
            _ => None,
        })
    }

    /// Derive the pii event, if any flagged field carries a value.
    pub fn extract(&self, event: &EnrichedEvent) -> Option<EnrichedEvent> {
        let mut derived = EnrichedEvent::default();
        let mut any = false;

        for field in &self.fields {
            if let Some(value) = event.get(field) {
                derived.set(field, value);
                any = true;
            }
        }

        if !any {
            return None;
        }

        derived.event_id = event.event_id.clone();
        derived.platform = event.platform.clone();
        derived.etl_tstamp = event.etl_tstamp.clone();
        derived.event = Some("pii_transformation".to_string());
        Some(derived)
    }
}
