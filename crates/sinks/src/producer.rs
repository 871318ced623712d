//! The producer seam
//!
//! A [`StreamProducer`] delivers one batch to a downstream broker and
//! reports per-record results, the shape cloud stream APIs expose. The
//! batching sink owns retries; producers just attempt one delivery and
//! classify failures as transient (retry forever) or fatal (raise now).

use async_trait::async_trait;
use thiserror::Error;

/// One record ready for the wire: payload plus its final partition key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub partition_key: String,
    pub data: Vec<u8>,
}

impl OutboundRecord {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Per-batch delivery result. Indices refer into the submitted batch;
/// failed records are retried by the sink, successful ones must not be
/// resubmitted.
#[derive(Debug, Clone, Default)]
pub struct BatchResponse {
    /// Indices of records the broker rejected.
    pub failed: Vec<usize>,

    /// Broker-side failure detail, for logs.
    pub messages: Vec<String>,
}

impl BatchResponse {
    /// Everything was accepted.
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delivery errors, classified for the retry policy.
#[derive(Debug, Error)]
pub enum ProducerError {
    /// Worth retrying: network trouble, throttling, broker hiccups.
    #[error("transient producer failure: {0}")]
    Transient(String),

    /// Not worth retrying: misconfiguration or programmer error. Raised
    /// to the caller immediately and treated as fatal.
    #[error("fatal producer failure: {0}")]
    Fatal(String),
}

impl ProducerError {
    pub fn transient(msg: impl ToString) -> Self {
        Self::Transient(msg.to_string())
    }

    pub fn fatal(msg: impl ToString) -> Self {
        Self::Fatal(msg.to_string())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Delivers batches to one downstream stream or topic.
#[async_trait]
pub trait StreamProducer: Send + Sync {
    /// Attempt one delivery of the whole batch.
    ///
    /// `Ok` with failed indices means a partial acceptance; the sink
    /// retries just the failed subset.
    async fn send_batch(&self, records: &[OutboundRecord]) -> Result<BatchResponse, ProducerError>;

    /// Release broker resources. Called once, after the final flush.
    async fn close(&self) -> Result<(), ProducerError> {
        Ok(())
    }

    /// Producer kind for logs.
    fn kind(&self) -> &'static str;
}
