//! IP lookup enrichment
//!
//! Asset-backed: a tab-separated prefix table fetched by the asset manager
//! maps IPv4 prefixes to ISO country codes. The table is parsed once at
//! registry build time; lookups are longest-prefix string matches. This is
//! the reference asset-backed enrichment - a production GeoIP database
//! plugs in behind the same trait and asset plumbing.
//!
//! Asset format, one entry per line, `#` comments allowed:
//!
//! ```text
//! 81.2.69.\tGB
//! 216.160.\tUS
//! ```

use std::path::Path;

use sluice_model::EnrichedEvent;

use crate::{EnrichError, Enrichment, EnrichmentResult};

#[derive(Debug)]
pub struct IpLookupEnrichment {
    /// Prefix table sorted longest-first so the first match wins.
    entries: Vec<(String, String)>,
    database_uri: String,
}

impl IpLookupEnrichment {
    /// Parse the fetched prefix table.
    pub fn from_file(path: &Path, database_uri: String) -> Result<Self, EnrichError> {
        let text = std::fs::read_to_string(path).map_err(|source| EnrichError::AssetLoad {
            path: path.display().to_string(),
            source,
        })?;

        let mut entries = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((prefix, country)) = line.split_once('\t') else {
                return Err(EnrichError::AssetFormat {
                    path: path.display().to_string(),
                    reason: format!("line {}: expected prefix<TAB>country", line_no + 1),
                });
            };
            entries.push((prefix.trim().to_string(), country.trim().to_string()));
        }

        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Ok(Self {
            entries,
            database_uri,
        })
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl Enrichment for IpLookupEnrichment {
    fn name(&self) -> &'static str {
        "ip_lookup"
    }

    fn asset_uris(&self) -> Vec<String> {
        vec![self.database_uri.clone()]
    }

    fn apply(&self, event: &mut EnrichedEvent) -> EnrichmentResult {
        let Some(ip) = event.user_ipaddress.as_deref() else {
            return EnrichmentResult::ok();
        };

        if let Some((_, country)) = self.entries.iter().find(|(prefix, _)| ip.starts_with(prefix))
        {
            event.geo_country = Some(country.clone());
        }

        EnrichmentResult::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table(contents: &str) -> IpLookupEnrichment {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        IpLookupEnrichment::from_file(file.path(), "file:///db.tsv".into()).unwrap()
    }

    #[test]
    fn longest_prefix_wins() {
        let lookup = table("81.\tDE\n81.2.69.\tGB\n");

        let mut event = EnrichedEvent::default();
        event.user_ipaddress = Some("81.2.69.142".into());
        lookup.apply(&mut event);
        assert_eq!(event.geo_country.as_deref(), Some("GB"));

        let mut event = EnrichedEvent::default();
        event.user_ipaddress = Some("81.99.0.1".into());
        lookup.apply(&mut event);
        assert_eq!(event.geo_country.as_deref(), Some("DE"));
    }

    #[test]
    fn unknown_ip_leaves_the_event_untouched() {
        let lookup = table("81.2.69.\tGB\n");
        let mut event = EnrichedEvent::default();
        event.user_ipaddress = Some("10.0.0.1".into());
        let result = lookup.apply(&mut event);
        assert!(result.failures.is_empty());
        assert_eq!(event.geo_country, None);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let lookup = table("# comment\n\n81.2.69.\tGB\n");
        assert_eq!(lookup.entry_count(), 1);
    }

    #[test]
    fn malformed_lines_fail_the_build() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "81.2.69. GB without a tab\n").unwrap();
        let err =
            IpLookupEnrichment::from_file(file.path(), "file:///db.tsv".into()).unwrap_err();
        assert!(matches!(err, EnrichError::AssetFormat { .. }));
    }

    #[test]
    fn reports_its_asset_uri() {
        let lookup = table("81.\tDE\n");
        assert_eq!(lookup.asset_uris(), vec!["file:///db.tsv".to_string()]);
    }
}
