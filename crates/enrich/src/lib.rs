//! Sluice - Enrichment
//!
//! The enrichment chain and the per-payload dispatcher.
//!
//! # Overview
//!
//! An [`Enrichment`] is a small, synchronous transformation of one
//! [`EnrichedEvent`](sluice_model::EnrichedEvent): it may fill in fields,
//! attach self-describing contexts, or fail with messages. Configured
//! enrichments are assembled into an immutable [`EnrichmentRegistry`]
//! snapshot; the asset manager swaps whole snapshots atomically, so one
//! dispatch call always sees one coherent chain.
//!
//! The [`Dispatcher`] drives a raw payload end to end: decode, map to base
//! events, run the chain, gate on the record size ceiling, split out pii
//! events. It never fails - every per-record problem becomes a bad row.
//!
//! # Design
//!
//! - **Never block**: enrichments do no I/O in `apply`; anything they need
//!   from the network is fetched ahead of time as an asset
//! - **Thread-safe**: enrichments are shared across the worker pool and
//!   must be `Send + Sync`
//! - **Fail closed**: an event whose chain reports any failure is excluded
//!   from the good output and emitted as one aggregated bad row

mod campaign;
mod dispatcher;
mod error;
mod fingerprint;
mod ip_lookup;
mod pii;
mod registry;
mod schema;

pub use campaign::CampaignAttributionEnrichment;
pub use dispatcher::{DispatchResult, Dispatcher};
pub use error::EnrichError;
pub use fingerprint::EventFingerprintEnrichment;
pub use ip_lookup::IpLookupEnrichment;
pub use pii::PiiExtractor;
pub use registry::{
    build_registry, configured_asset_uris, shared, AssetPaths, EnrichmentRegistry, SharedRegistry,
};
pub use schema::{PermissiveSchemaClient, SchemaClient, SchemaKey};

use sluice_model::EnrichedEvent;

/// What one enrichment produced for one event.
#[derive(Debug, Default)]
pub struct EnrichmentResult {
    /// Self-describing contexts to attach to the event's derived contexts.
    pub contexts: Vec<serde_json::Value>,

    /// Failure messages. Any failure excludes the event from the good
    /// output; all of an event's failures aggregate into one bad row.
    pub failures: Vec<String>,
}

impl EnrichmentResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            contexts: Vec::new(),
            failures: vec![message.into()],
        }
    }
}

/// One step of the enrichment chain.
///
/// Implementations must be cheap (microseconds), synchronous and
/// `Send + Sync`; they run concurrently across the enrich worker pool.
pub trait Enrichment: Send + Sync {
    /// Name used in config, logs and failure messages.
    fn name(&self) -> &'static str;

    /// Remote files this enrichment needs locally before it can be built.
    fn asset_uris(&self) -> Vec<String> {
        Vec::new()
    }

    /// Apply to one event. May mutate any field; later enrichments see the
    /// result.
    fn apply(&self, event: &mut EnrichedEvent) -> EnrichmentResult;
}
