//! Campaign attribution enrichment
//!
//! Reads `utm_*` and ad click-id parameters out of the page URL query
//! string and fills the `mkt_*` fields. A missing or unparseable page URL
//! is a no-op, not a failure.

use sluice_model::EnrichedEvent;
use url::Url;

use crate::{Enrichment, EnrichmentResult};

/// Click-id query parameters and the networks they identify.
const CLICK_IDS: &[(&str, &str)] = &[
    ("gclid", "Google"),
    ("msclkid", "Microsoft"),
    ("dclid", "DoubleClick"),
    ("fbclid", "Facebook"),
];

pub struct CampaignAttributionEnrichment;

impl Enrichment for CampaignAttributionEnrichment {
    fn name(&self) -> &'static str {
        "campaign_attribution"
    }

    fn apply(&self, event: &mut EnrichedEvent) -> EnrichmentResult {
        let Some(page_url) = event.page_url.as_deref() else {
            return EnrichmentResult::ok();
        };
        let Ok(url) = Url::parse(page_url) else {
            return EnrichmentResult::ok();
        };

        for (key, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            let value = value.into_owned();
            match key.as_ref() {
                "utm_medium" => event.mkt_medium = Some(value),
                "utm_source" => event.mkt_source = Some(value),
                "utm_term" => event.mkt_term = Some(value),
                "utm_content" => event.mkt_content = Some(value),
                "utm_campaign" => event.mkt_campaign = Some(value),
                other => {
                    if let Some((_, network)) =
                        CLICK_IDS.iter().find(|(param, _)| *param == other)
                    {
                        event.mkt_clickid = Some(value);
                        event.mkt_network = Some((*network).to_string());
                    }
                }
            }
        }

        EnrichmentResult::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enriched(url: &str) -> EnrichedEvent {
        let mut event = EnrichedEvent::default();
        event.page_url = Some(url.into());
        CampaignAttributionEnrichment.apply(&mut event);
        event
    }

    #[test]
    fn extracts_utm_parameters() {
        let event = enriched(
            "https://shop.example.com/landing?utm_source=newsletter&utm_medium=email&utm_campaign=spring%20sale",
        );
        assert_eq!(event.mkt_source.as_deref(), Some("newsletter"));
        assert_eq!(event.mkt_medium.as_deref(), Some("email"));
        assert_eq!(event.mkt_campaign.as_deref(), Some("spring sale"));
        assert_eq!(event.mkt_term, None);
    }

    #[test]
    fn maps_click_ids_to_networks() {
        let event = enriched("https://example.com/?gclid=abc123");
        assert_eq!(event.mkt_clickid.as_deref(), Some("abc123"));
        assert_eq!(event.mkt_network.as_deref(), Some("Google"));

        let event = enriched("https://example.com/?fbclid=xyz");
        assert_eq!(event.mkt_network.as_deref(), Some("Facebook"));
    }

    #[test]
    fn missing_or_invalid_url_is_a_no_op() {
        let mut event = EnrichedEvent::default();
        let result = CampaignAttributionEnrichment.apply(&mut event);
        assert!(result.failures.is_empty());
        assert_eq!(event.mkt_source, None);

        let event = enriched("not a url at all");
        assert_eq!(event.mkt_source, None);
    }

    #[test]
    fn empty_parameter_values_are_ignored() {
        let event = enriched("https://example.com/?utm_source=&utm_medium=email");
        assert_eq!(event.mkt_source, None);
        assert_eq!(event.mkt_medium.as_deref(), Some("email"));
    }
}
