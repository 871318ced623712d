//! Asset manager errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to fetch {uri}: {reason}")]
    Fetch { uri: String, reason: String },

    #[error("fetch of {uri} returned HTTP {status}")]
    HttpStatus { uri: String, status: u16 },

    #[error("fetch of {uri} timed out")]
    Timeout { uri: String },

    #[error("asset I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to rebuild enrichment registry: {0}")]
    Registry(#[from] sluice_enrich::EnrichError),
}

impl AssetError {
    pub fn fetch(uri: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            uri: uri.into(),
            reason: reason.to_string(),
        }
    }
}
