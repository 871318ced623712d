//! Enrichment configuration

use serde::Deserialize;

use crate::ConfigError;

/// One configured enrichment. The chain runs in declaration order.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnrichmentConfig {
    /// SHA-256 fingerprint over a set of canonical fields.
    EventFingerprint {
        #[serde(default = "default_fingerprint_fields")]
        fields: Vec<String>,
    },

    /// Parses `utm_*` and click-id parameters out of the page URL.
    CampaignAttribution,

    /// Asset-backed IPv4 prefix to country lookup.
    IpLookup {
        /// Where the prefix database is fetched from (http(s) or file URI).
        database_uri: String,
    },

    /// Splits the listed fields into a derived pii event.
    PiiPseudonymization {
        fields: Vec<String>,
    },
}

fn default_fingerprint_fields() -> Vec<String> {
    ["useragent", "user_ipaddress", "page_url", "event", "dvce_created_tstamp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Canonical fields the pii enrichment may extract.
pub(crate) const PII_CAPABLE_FIELDS: &[&str] = &[
    "user_id",
    "user_ipaddress",
    "user_fingerprint",
    "domain_userid",
    "network_userid",
    "domain_sessionid",
    "ip_organization",
    "ip_domain",
    "tr_orderid",
    "ti_orderid",
    "mkt_term",
    "mkt_content",
    "se_category",
    "se_action",
    "se_label",
    "se_property",
    "page_url",
    "page_title",
    "page_referrer",
    "useragent",
    "refr_domain_userid",
];

impl EnrichmentConfig {
    /// Enrichment type name as it appears in config and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EnrichmentConfig::EventFingerprint { .. } => "event_fingerprint",
            EnrichmentConfig::CampaignAttribution => "campaign_attribution",
            EnrichmentConfig::IpLookup { .. } => "ip_lookup",
            EnrichmentConfig::PiiPseudonymization { .. } => "pii_pseudonymization",
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        match self {
            EnrichmentConfig::EventFingerprint { fields } => {
                if fields.is_empty() {
                    return Err(ConfigError::invalid(
                        "enrichments.event_fingerprint.fields must not be empty",
                    ));
                }
                Ok(())
            }
            EnrichmentConfig::CampaignAttribution => Ok(()),
            EnrichmentConfig::IpLookup { database_uri } => {
                if database_uri.is_empty() {
                    return Err(ConfigError::invalid(
                        "enrichments.ip_lookup.database_uri must not be empty",
                    ));
                }
                Ok(())
            }
            EnrichmentConfig::PiiPseudonymization { fields } => {
                if fields.is_empty() {
                    return Err(ConfigError::invalid(
                        "enrichments.pii_pseudonymization.fields must not be empty",
                    ));
                }
                for field in fields {
                    if !PII_CAPABLE_FIELDS.contains(&field.as_str()) {
                        return Err(ConfigError::invalid(format!(
                            "enrichments.pii_pseudonymization: {field} is not a pii-capable field"
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}
