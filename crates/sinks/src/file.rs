//! File producer
//!
//! Appends framed records to a local stream file - the same format the
//! file source reads, so one pipeline's output can feed another's input.

use std::path::Path;

use async_trait::async_trait;
use sluice_model::encode_frame;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::{BatchResponse, OutboundRecord, ProducerError, SinkError, StreamProducer};

pub struct FileProducer {
    file: Mutex<File>,
}

impl FileProducer {
    /// Open (or create) the stream file for appending.
    pub async fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl StreamProducer for FileProducer {
    async fn send_batch(&self, records: &[OutboundRecord]) -> Result<BatchResponse, ProducerError> {
        let mut wire = Vec::new();
        for record in records {
            wire.extend_from_slice(&encode_frame(&record.partition_key, &record.data));
        }

        let mut file = self.file.lock().await;
        file.write_all(&wire)
            .await
            .map_err(|e| ProducerError::transient(format!("append failed: {e}")))?;
        file.flush()
            .await
            .map_err(|e| ProducerError::transient(format!("flush failed: {e}")))?;

        Ok(BatchResponse::ok())
    }

    async fn close(&self) -> Result<(), ProducerError> {
        self.file
            .lock()
            .await
            .sync_all()
            .await
            .map_err(|e| ProducerError::transient(format!("sync failed: {e}")))
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}
