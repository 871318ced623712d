//! Source errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt frame stream: {0}")]
    Frame(#[from] sluice_model::FrameError),

    #[error("checkpoint {path} unusable: {reason}")]
    Checkpoint { path: String, reason: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}
