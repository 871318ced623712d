//! Enrichment errors
//!
//! These errors surface while *building* the chain (bad config, unreadable
//! asset). Failures while *applying* the chain never error - they become
//! bad rows.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("invalid enrichment configuration: {0}")]
    Config(String),

    #[error("missing asset for enrichment {enrichment}: {uri}")]
    MissingAsset { enrichment: String, uri: String },

    #[error("failed to load asset {path}: {source}")]
    AssetLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed asset {path}: {reason}")]
    AssetFormat { path: String, reason: String },
}

impl EnrichError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
