//! The enrichment registry
//!
//! An immutable snapshot of the configured chain. The asset manager owns
//! the shared reference and replaces whole snapshots through an
//! `ArcSwap`; dispatch loads the pointer once per payload, so a swap never
//! tears a chain mid-record.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use sluice_config::EnrichmentConfig;

use crate::{
    CampaignAttributionEnrichment, EnrichError, Enrichment, EventFingerprintEnrichment,
    IpLookupEnrichment,
};

/// Local paths of fetched assets, keyed by `(enrichment kind, asset uri)`.
pub type AssetPaths = HashMap<(String, String), PathBuf>;

/// Immutable snapshot of the configured enrichment chain.
pub struct EnrichmentRegistry {
    enrichments: Vec<Arc<dyn Enrichment>>,
}

impl EnrichmentRegistry {
    /// A registry with no enrichments; dispatch passes events through
    /// untouched.
    pub fn empty() -> Self {
        Self {
            enrichments: Vec::new(),
        }
    }

    /// A registry over an explicit chain. Config-driven construction goes
    /// through [`build_registry`]; this is for embedders and tests that
    /// supply their own [`Enrichment`] implementations.
    pub fn from_enrichments(enrichments: Vec<Arc<dyn Enrichment>>) -> Self {
        Self { enrichments }
    }

    /// The chain, in configured order.
    pub fn enrichments(&self) -> &[Arc<dyn Enrichment>] {
        &self.enrichments
    }

    pub fn len(&self) -> usize {
        self.enrichments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enrichments.is_empty()
    }

    /// Enrichment names in chain order, for logs.
    pub fn names(&self) -> Vec<&'static str> {
        self.enrichments.iter().map(|e| e.name()).collect()
    }
}

impl std::fmt::Debug for EnrichmentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentRegistry")
            .field("enrichments", &self.names())
            .finish()
    }
}

/// Shared handle to the current registry snapshot. Readers pay one atomic
/// load; the asset manager is the only writer.
pub type SharedRegistry = Arc<ArcSwap<EnrichmentRegistry>>;

/// Wrap a registry for sharing.
pub fn shared(registry: EnrichmentRegistry) -> SharedRegistry {
    Arc::new(ArcSwap::from_pointee(registry))
}

/// Every `(enrichment kind, asset uri)` the configured chain needs fetched
/// before it can be built.
pub fn configured_asset_uris(configs: &[EnrichmentConfig]) -> Vec<(String, String)> {
    configs
        .iter()
        .filter_map(|config| match config {
            EnrichmentConfig::IpLookup { database_uri } => {
                Some((config.kind().to_string(), database_uri.clone()))
            }
            _ => None,
        })
        .collect()
}

/// Build a registry snapshot from config and already-fetched assets.
///
/// Pii pseudonymization is configured alongside the chain but is not a
/// chain step - it runs on good events after the size gate - so it is
/// skipped here; see [`crate::PiiExtractor`].
pub fn build_registry(
    configs: &[EnrichmentConfig],
    assets: &AssetPaths,
) -> Result<EnrichmentRegistry, EnrichError> {
    let mut enrichments: Vec<Arc<dyn Enrichment>> = Vec::new();

    for config in configs {
        match config {
            EnrichmentConfig::EventFingerprint { fields } => {
                enrichments.push(Arc::new(EventFingerprintEnrichment::new(fields.clone())?));
            }
            EnrichmentConfig::CampaignAttribution => {
                enrichments.push(Arc::new(CampaignAttributionEnrichment));
            }
            EnrichmentConfig::IpLookup { database_uri } => {
                let key = (config.kind().to_string(), database_uri.clone());
                let path = assets.get(&key).ok_or_else(|| EnrichError::MissingAsset {
                    enrichment: config.kind().to_string(),
                    uri: database_uri.clone(),
                })?;
                enrichments.push(Arc::new(IpLookupEnrichment::from_file(
                    path,
                    database_uri.clone(),
                )?));
            }
            EnrichmentConfig::PiiPseudonymization { .. } => {}
        }
    }

    Ok(EnrichmentRegistry { enrichments })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builds_the_configured_chain_in_order() {
        let configs = vec![
            EnrichmentConfig::CampaignAttribution,
            EnrichmentConfig::EventFingerprint {
                fields: vec!["useragent".into()],
            },
        ];

        let registry = build_registry(&configs, &AssetPaths::new()).unwrap();
        assert_eq!(registry.names(), vec!["campaign_attribution", "event_fingerprint"]);
    }

    #[test]
    fn pii_config_is_not_a_chain_step() {
        let configs = vec![EnrichmentConfig::PiiPseudonymization {
            fields: vec!["user_id".into()],
        }];
        let registry = build_registry(&configs, &AssetPaths::new()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn ip_lookup_requires_its_asset() {
        let configs = vec![EnrichmentConfig::IpLookup {
            database_uri: "https://example.com/db.tsv".into(),
        }];
        let err = build_registry(&configs, &AssetPaths::new()).unwrap_err();
        assert!(matches!(err, EnrichError::MissingAsset { .. }));
    }

    #[test]
    fn ip_lookup_builds_from_its_fetched_asset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "81.2.69.\tGB").unwrap();

        let uri = "https://example.com/db.tsv".to_string();
        let mut assets = AssetPaths::new();
        assets.insert(
            ("ip_lookup".to_string(), uri.clone()),
            file.path().to_path_buf(),
        );

        let configs = vec![EnrichmentConfig::IpLookup { database_uri: uri }];
        let registry = build_registry(&configs, &assets).unwrap();
        assert_eq!(registry.names(), vec!["ip_lookup"]);
    }

    #[test]
    fn configured_asset_uris_lists_only_asset_backed_enrichments() {
        let configs = vec![
            EnrichmentConfig::CampaignAttribution,
            EnrichmentConfig::IpLookup {
                database_uri: "file:///tmp/db.tsv".into(),
            },
        ];
        assert_eq!(
            configured_asset_uris(&configs),
            vec![("ip_lookup".to_string(), "file:///tmp/db.tsv".to_string())]
        );
    }

    #[test]
    fn shared_registry_swap_is_visible_to_readers() {
        let handle = shared(EnrichmentRegistry::empty());
        assert!(handle.load().is_empty());

        let next = build_registry(
            &[EnrichmentConfig::CampaignAttribution],
            &AssetPaths::new(),
        )
        .unwrap();
        handle.store(Arc::new(next));
        assert_eq!(handle.load().len(), 1);
    }
}
