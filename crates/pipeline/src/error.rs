//! Pipeline errors
//!
//! Anything that surfaces here is fatal: per-record problems became bad
//! rows long before this type is involved.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source failed: {0}")]
    Source(#[from] sluice_sources::SourceError),

    #[error("sink {name} failed: {source}")]
    Sink {
        name: String,
        #[source]
        source: sluice_sinks::SinkError,
    },

    #[error("failed to publish a bad row: {0}")]
    BadRowLost(sluice_sinks::SinkError),

    #[error("pipeline task panicked: {0}")]
    TaskPanic(String),
}

impl PipelineError {
    pub fn sink(name: &str, source: sluice_sinks::SinkError) -> Self {
        Self::Sink {
            name: name.to_string(),
            source,
        }
    }
}
