//! In-memory source
//!
//! Feeds a fixed set of payloads into the pipeline and records every ack,
//! with offsets numbered from zero. The stream ends after the last
//! payload, which lets a test drive the pipeline to a natural shutdown.

use std::sync::Mutex;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{AckHandle, Committer, RawRecord, RecordSource, SourceError};

/// Records committed offsets for inspection.
#[derive(Debug, Default)]
pub struct AckLog {
    acked: Mutex<Vec<u64>>,
}

impl AckLog {
    /// Offsets acked so far, in ack order.
    pub fn acked(&self) -> Vec<u64> {
        self.acked.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.acked.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.acked.lock().unwrap().is_empty()
    }
}

impl Committer for AckLog {
    fn commit(&self, offset: u64) {
        self.acked.lock().unwrap().push(offset);
    }
}

pub struct ChannelSource {
    payloads: Vec<Bytes>,
    ack_log: Arc<AckLog>,
}

impl ChannelSource {
    /// Build a source over the given payloads plus the log its acks land
    /// in.
    pub fn new(payloads: Vec<Vec<u8>>) -> (Self, Arc<AckLog>) {
        let ack_log = Arc::new(AckLog::default());
        (
            Self {
                payloads: payloads.into_iter().map(Bytes::from).collect(),
                ack_log: Arc::clone(&ack_log),
            },
            ack_log,
        )
    }
}

#[async_trait]
impl RecordSource for ChannelSource {
    async fn run(
        self: Box<Self>,
        tx: mpsc::Sender<RawRecord>,
        cancel: CancellationToken,
    ) -> Result<(), SourceError> {
        for (offset, payload) in self.payloads.into_iter().enumerate() {
            let committer: Arc<dyn Committer> = self.ack_log.clone() as Arc<dyn Committer>;
            let record = RawRecord::new(payload, AckHandle::new(offset as u64, committer));

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                sent = tx.send(record) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}
