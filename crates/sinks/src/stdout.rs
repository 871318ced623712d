//! Stdout producer
//!
//! One record per line on standard output. Records are line-shaped by
//! construction (tab-separated events, single-line JSON bad rows), so no
//! framing is needed. Partition keys are dropped; stdout has no shards.

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use crate::{BatchResponse, OutboundRecord, ProducerError, StreamProducer};

pub struct StdoutProducer {
    stdout: Mutex<Stdout>,
}

impl StdoutProducer {
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdoutProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamProducer for StdoutProducer {
    async fn send_batch(&self, records: &[OutboundRecord]) -> Result<BatchResponse, ProducerError> {
        let mut wire = Vec::new();
        for record in records {
            wire.extend_from_slice(&record.data);
            wire.push(b'\n');
        }

        let mut stdout = self.stdout.lock().await;
        stdout
            .write_all(&wire)
            .await
            .map_err(|e| ProducerError::transient(format!("stdout write failed: {e}")))?;
        stdout
            .flush()
            .await
            .map_err(|e| ProducerError::transient(format!("stdout flush failed: {e}")))?;

        Ok(BatchResponse::ok())
    }

    fn kind(&self) -> &'static str {
        "stdout"
    }
}
