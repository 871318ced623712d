//! Sink errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    /// The batcher has stopped; no more records can be queued.
    #[error("sink {0} is closed")]
    Closed(String),

    /// The producer raised a fatal (non-retryable) error.
    #[error("unrecoverable producer failure: {0}")]
    Producer(String),

    /// The batcher task itself died.
    #[error("{0}")]
    Batcher(String),

    #[error("sink configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    pub fn closed(name: &str) -> Self {
        Self::Closed(name.to_string())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
