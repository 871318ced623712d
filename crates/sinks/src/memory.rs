//! In-memory producer
//!
//! Test double for the pipeline and sink test suites: records every
//! accepted batch and plays back a scripted sequence of failures first.
//! Also usable as a black-hole producer for benchmarks.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;

use crate::{BatchResponse, OutboundRecord, ProducerError, StreamProducer};

/// One scripted delivery outcome, consumed per `send_batch` call.
#[derive(Debug, Clone)]
pub enum FailureMode {
    /// Reject the whole batch with a transient error.
    Transient,
    /// Reject the whole batch with a fatal error.
    Fatal,
    /// Accept the batch but report these indices as rejected.
    Partial(Vec<usize>),
}

#[derive(Default)]
struct Inner {
    script: Vec<FailureMode>,
    accepted: Vec<OutboundRecord>,
    attempts: Vec<Instant>,
    closed: bool,
}

/// Scriptable in-memory [`StreamProducer`].
#[derive(Clone, Default)]
pub struct MemoryProducer {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue failure outcomes for the next `send_batch` calls, in order.
    /// Once the script is exhausted every delivery succeeds.
    pub fn script_failures(&self, modes: Vec<FailureMode>) {
        let mut inner = self.inner.lock().unwrap();
        inner.script = modes;
        inner.script.reverse();
    }

    /// Every record accepted so far, in acceptance order.
    pub fn accepted(&self) -> Vec<OutboundRecord> {
        self.inner.lock().unwrap().accepted.clone()
    }

    /// Accepted payloads decoded as UTF-8 lines.
    pub fn accepted_strings(&self) -> Vec<String> {
        self.accepted()
            .into_iter()
            .map(|r| String::from_utf8_lossy(&r.data).into_owned())
            .collect()
    }

    /// Timestamps of every `send_batch` call, successful or not.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.inner.lock().unwrap().attempts.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

#[async_trait]
impl StreamProducer for MemoryProducer {
    async fn send_batch(&self, records: &[OutboundRecord]) -> Result<BatchResponse, ProducerError> {
        let mut inner = self.inner.lock().unwrap();
        inner.attempts.push(Instant::now());

        match inner.script.pop() {
            Some(FailureMode::Transient) => Err(ProducerError::transient("scripted rejection")),
            Some(FailureMode::Fatal) => Err(ProducerError::fatal("scripted fatal failure")),
            Some(FailureMode::Partial(failed)) => {
                for (i, record) in records.iter().enumerate() {
                    if !failed.contains(&i) {
                        inner.accepted.push(record.clone());
                    }
                }
                Ok(BatchResponse {
                    failed,
                    messages: vec!["scripted partial rejection".into()],
                })
            }
            None => {
                inner.accepted.extend(records.iter().cloned());
                Ok(BatchResponse::ok())
            }
        }
    }

    async fn close(&self) -> Result<(), ProducerError> {
        self.inner.lock().unwrap().closed = true;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
