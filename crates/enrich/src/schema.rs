//! Schema validation seam
//!
//! The real schema registry client is an external collaborator; the
//! dispatcher only needs [`SchemaClient`]. The permissive implementation
//! shipped here checks self-describing structure without consulting a
//! registry.

use serde_json::Value;

/// Parsed schema URI: `iglu:vendor/name/format/1-0-0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaKey {
    pub vendor: String,
    pub name: String,
    pub format: String,
    pub version: String,
}

impl SchemaKey {
    /// Parse an `iglu:` schema URI.
    pub fn parse(uri: &str) -> Result<Self, String> {
        let rest = uri
            .strip_prefix("iglu:")
            .ok_or_else(|| format!("schema uri does not start with iglu: ({uri})"))?;

        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() != 4 || parts.iter().any(|p| p.is_empty()) {
            return Err(format!(
                "schema uri must be iglu:vendor/name/format/version ({uri})"
            ));
        }

        Ok(Self {
            vendor: parts[0].to_string(),
            name: parts[1].to_string(),
            format: parts[2].to_string(),
            version: parts[3].to_string(),
        })
    }
}

impl std::fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "iglu:{}/{}/{}/{}",
            self.vendor, self.name, self.format, self.version
        )
    }
}

/// Validates a JSON document against a schema.
pub trait SchemaClient: Send + Sync {
    /// `Ok(())` when the document conforms; otherwise every violation
    /// found.
    fn validate(&self, json: &Value, key: &SchemaKey) -> Result<(), Vec<String>>;
}

/// Accepts any document for any known-shaped key. Stands in for the
/// registry-backed client in tests and minimal deployments.
#[derive(Debug, Clone, Default)]
pub struct PermissiveSchemaClient;

impl SchemaClient for PermissiveSchemaClient {
    fn validate(&self, json: &Value, key: &SchemaKey) -> Result<(), Vec<String>> {
        if json.is_null() {
            return Err(vec![format!("document for {key} is null")]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_uri() {
        let key = SchemaKey::parse("iglu:com.acme/link_click/jsonschema/1-0-2").unwrap();
        assert_eq!(key.vendor, "com.acme");
        assert_eq!(key.name, "link_click");
        assert_eq!(key.format, "jsonschema");
        assert_eq!(key.version, "1-0-2");
        assert_eq!(key.to_string(), "iglu:com.acme/link_click/jsonschema/1-0-2");
    }

    #[test]
    fn rejects_wrong_prefix_and_shape() {
        assert!(SchemaKey::parse("http://example.com/schema").is_err());
        assert!(SchemaKey::parse("iglu:com.acme/link_click/jsonschema").is_err());
        assert!(SchemaKey::parse("iglu:com.acme//jsonschema/1-0-0").is_err());
    }

    #[test]
    fn permissive_client_rejects_null_documents() {
        let key = SchemaKey::parse("iglu:com.acme/x/jsonschema/1-0-0").unwrap();
        assert!(PermissiveSchemaClient.validate(&Value::Null, &key).is_err());
        assert!(PermissiveSchemaClient
            .validate(&serde_json::json!({"a": 1}), &key)
            .is_ok());
    }
}
