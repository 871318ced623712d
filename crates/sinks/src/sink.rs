//! The batching sink
//!
//! One `Sink` per output. Records enter through a bounded channel (the
//! back-pressure point of the whole pipeline) and a single batcher task
//! accumulates them until one of three limits fires - record count, byte
//! count, or age of the oldest buffered record - then delivers the batch
//! through the producer, retrying rejected subsets with capped
//! exponential backoff. Transient failures retry forever; fatal producer
//! errors stop the batcher and surface through `close`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sluice_config::OutputConfig;
use sluice_model::AttributedData;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{OutboundRecord, SinkError, StreamProducer};

/// Counters kept by the batcher task.
#[derive(Debug, Default)]
struct SinkMetrics {
    records_published: AtomicU64,
    bytes_published: AtomicU64,
    batches_flushed: AtomicU64,
    delivery_retries: AtomicU64,
}

/// Point-in-time snapshot of a sink's counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkMetricsSnapshot {
    pub records_published: u64,
    pub bytes_published: u64,
    pub batches_flushed: u64,
    pub delivery_retries: u64,
}

impl SinkMetrics {
    fn snapshot(&self) -> SinkMetricsSnapshot {
        SinkMetricsSnapshot {
            records_published: self.records_published.load(Ordering::Relaxed),
            bytes_published: self.bytes_published.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            delivery_retries: self.delivery_retries.load(Ordering::Relaxed),
        }
    }
}

/// Batched, retrying sink over one producer.
pub struct Sink {
    name: String,
    tx: mpsc::Sender<AttributedData>,
    task: JoinHandle<Result<(), SinkError>>,
    metrics: Arc<SinkMetrics>,
}

impl Sink {
    /// Construct the sink and spawn its batcher task.
    pub fn spawn(
        name: impl Into<String>,
        config: &OutputConfig,
        producer: Arc<dyn StreamProducer>,
    ) -> Self {
        let name = name.into();
        let metrics = Arc::new(SinkMetrics::default());

        // The channel is the bounded buffer; publish blocks when it is
        // full and the batcher can't keep up.
        let (tx, rx) = mpsc::channel(config.max_batch_size.max(1));

        let batcher = Batcher {
            name: name.clone(),
            producer,
            max_batch_size: config.max_batch_size,
            max_batch_bytes: config.max_batch_bytes,
            delay_threshold: config.delay_threshold,
            min_backoff: config.backoff_policy.min_backoff,
            max_backoff: config.backoff_policy.max_backoff,
            metrics: Arc::clone(&metrics),
        };

        let task = tokio::spawn(batcher.run(rx));

        Self {
            name,
            tx,
            task,
            metrics,
        }
    }

    /// Queue one record for delivery.
    ///
    /// Completes when the record is accepted into the internal buffer;
    /// suspends while the buffer is full. An error means the batcher has
    /// stopped (fatal producer failure) - the cause is surfaced by
    /// [`Sink::close`].
    pub async fn publish(&self, record: AttributedData) -> Result<(), SinkError> {
        self.tx
            .send(record)
            .await
            .map_err(|_| SinkError::closed(&self.name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> SinkMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Flush everything queued and release the producer.
    ///
    /// Records accepted by `publish` before this call are delivered (with
    /// the usual retry policy) before it returns.
    pub async fn close(self) -> Result<SinkMetricsSnapshot, SinkError> {
        let Sink {
            name,
            tx,
            task,
            metrics,
        } = self;

        // Closing the channel lets the batcher drain and finish.
        drop(tx);

        let result = task
            .await
            .map_err(|e| SinkError::Batcher(format!("batcher task panicked: {e}")))?;

        let snapshot = metrics.snapshot();
        info!(
            sink = %name,
            records = snapshot.records_published,
            bytes = snapshot.bytes_published,
            batches = snapshot.batches_flushed,
            retries = snapshot.delivery_retries,
            "sink closed"
        );

        result.map(|()| snapshot)
    }
}

struct Batcher {
    name: String,
    producer: Arc<dyn StreamProducer>,
    max_batch_size: usize,
    max_batch_bytes: usize,
    delay_threshold: Duration,
    min_backoff: Duration,
    max_backoff: Duration,
    metrics: Arc<SinkMetrics>,
}

impl Batcher {
    async fn run(self, mut rx: mpsc::Receiver<AttributedData>) -> Result<(), SinkError> {
        debug!(sink = %self.name, producer = self.producer.kind(), "sink batcher started");

        let mut batch: Vec<OutboundRecord> = Vec::with_capacity(self.max_batch_size);
        let mut batch_bytes = 0usize;
        let mut oldest: Option<Instant> = None;

        loop {
            let deadline = oldest.map(|at| at + self.delay_threshold);

            tokio::select! {
                received = rx.recv() => match received {
                    Some(record) => {
                        if batch.is_empty() {
                            oldest = Some(Instant::now());
                        }
                        let outbound = to_outbound(record);
                        batch_bytes += outbound.len();
                        batch.push(outbound);

                        if batch.len() >= self.max_batch_size
                            || batch_bytes >= self.max_batch_bytes
                        {
                            self.flush(&mut batch, &mut batch_bytes, &mut oldest).await?;
                        }
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    self.flush(&mut batch, &mut batch_bytes, &mut oldest).await?;
                }
            }
        }

        // Channel closed: final flush, then release the producer.
        self.flush(&mut batch, &mut batch_bytes, &mut oldest).await?;
        if let Err(e) = self.producer.close().await {
            warn!(sink = %self.name, error = %e, "producer close failed");
        }

        debug!(sink = %self.name, "sink batcher finished");
        Ok(())
    }

    /// Deliver the current batch, retrying rejected subsets until the
    /// whole batch is accepted or a fatal error surfaces.
    async fn flush(
        &self,
        batch: &mut Vec<OutboundRecord>,
        batch_bytes: &mut usize,
        oldest: &mut Option<Instant>,
    ) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut pending = std::mem::take(batch);
        let total_records = pending.len() as u64;
        let total_bytes = *batch_bytes as u64;
        *batch_bytes = 0;
        *oldest = None;

        let mut delay = self.min_backoff;

        loop {
            match self.producer.send_batch(&pending).await {
                Ok(response) if response.is_complete() => {
                    self.metrics
                        .records_published
                        .fetch_add(total_records, Ordering::Relaxed);
                    self.metrics
                        .bytes_published
                        .fetch_add(total_bytes, Ordering::Relaxed);
                    self.metrics.batches_flushed.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Ok(response) => {
                    warn!(
                        sink = %self.name,
                        rejected = response.failed.len(),
                        of = pending.len(),
                        detail = ?response.messages,
                        retry_in_ms = delay.as_millis(),
                        "broker rejected part of the batch"
                    );
                    pending = response
                        .failed
                        .iter()
                        .filter_map(|&i| pending.get(i).cloned())
                        .collect();
                    if pending.is_empty() {
                        // Every reported index was out of range; nothing
                        // is left to retry.
                        return Ok(());
                    }
                }
                Err(e) if e.is_fatal() => {
                    return Err(SinkError::Producer(e.to_string()));
                }
                Err(e) => {
                    warn!(
                        sink = %self.name,
                        error = %e,
                        retry_in_ms = delay.as_millis(),
                        "batch delivery failed"
                    );
                }
            }

            self.metrics.delivery_retries.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.max_backoff);
        }
    }
}

/// Derive the partition key: the record's sole attribute value, or a
/// fresh random identifier. The key is a routing hint only.
fn to_outbound(record: AttributedData) -> OutboundRecord {
    let partition_key = record
        .partition_key()
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    OutboundRecord {
        partition_key,
        data: record.data,
    }
}

#[cfg(test)]
#[path = "sink_test.rs"]
mod tests;
