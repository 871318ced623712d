//! The pipeline runtime

use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use sluice_assets::PauseGate;
use sluice_config::{OutputsConfig, PartitionKeyField, PipelineConfig};
use sluice_enrich::{DispatchResult, Dispatcher};
use sluice_metrics::{PipelineMetrics, SharedExceptionReporter};
use sluice_model::{AttributedData, EnrichedEvent, Outcome};
use sluice_sinks::Sink;
use sluice_sources::{AckHandle, RawRecord, RecordSource};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{PipelineError, ReorderBuffer};

/// The three output sinks.
pub struct PipelineSinks {
    pub good: Sink,
    pub pii: Option<Sink>,
    pub bad: Sink,
}

/// One record queued for an enrich worker. The in-flight guard rides
/// along so the pause gate covers the record until its dispatch finishes.
struct Job {
    seq: u64,
    record: RawRecord,
    guard: sluice_assets::InFlightGuard,
}

/// One finished dispatch, headed for the output gate.
struct Completed {
    seq: u64,
    ack: AckHandle,
    result: DispatchResult,
}

pub struct PipelineRuntime {
    source: Box<dyn RecordSource>,
    dispatcher: Arc<Dispatcher>,
    sinks: PipelineSinks,
    gate: Arc<PauseGate>,
    metrics: Arc<PipelineMetrics>,
    exception: SharedExceptionReporter,
    concurrency: usize,
    ordered: bool,
    shutdown_timeout: Duration,
    good_key: Option<PartitionKeyField>,
    pii_key: Option<PartitionKeyField>,
}

impl PipelineRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn RecordSource>,
        dispatcher: Arc<Dispatcher>,
        sinks: PipelineSinks,
        gate: Arc<PauseGate>,
        metrics: Arc<PipelineMetrics>,
        exception: SharedExceptionReporter,
        pipeline_config: &PipelineConfig,
        outputs: &OutputsConfig,
    ) -> Self {
        Self {
            source,
            dispatcher,
            sinks,
            gate,
            metrics,
            exception,
            concurrency: pipeline_config.concurrency.max(1),
            ordered: pipeline_config.ordered,
            shutdown_timeout: pipeline_config.shutdown_timeout,
            good_key: outputs.good.partition_key,
            pii_key: outputs.pii.as_ref().and_then(|pii| pii.partition_key),
        }
    }

    /// Run until the source ends or `cancel` fires; then execute the
    /// shutdown choreography. Fatal errors are reported to the exception
    /// sink once before they are returned.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), PipelineError> {
        let Self {
            source,
            dispatcher,
            sinks,
            gate,
            metrics,
            exception,
            concurrency,
            ordered,
            shutdown_timeout,
            good_key,
            pii_key,
        } = self;

        info!(
            source = source.name(),
            concurrency,
            ordered,
            "pipeline starting"
        );

        // Source → feeder.
        let (intake_tx, intake_rx) = mpsc::channel::<RawRecord>(concurrency * 2);
        let source_task: JoinHandle<Result<(), sluice_sources::SourceError>> =
            tokio::spawn(source.run(intake_tx, cancel.clone()));

        // Feeder → workers, one shard per worker.
        let (result_tx, result_rx) = mpsc::channel::<Completed>(concurrency * 2);
        let mut shard_txs = Vec::with_capacity(concurrency);
        let mut worker_tasks = Vec::with_capacity(concurrency);
        for _ in 0..concurrency {
            let (shard_tx, shard_rx) = mpsc::channel::<Job>(1);
            shard_txs.push(shard_tx);
            worker_tasks.push(tokio::spawn(enrich_worker(
                shard_rx,
                Arc::clone(&dispatcher),
                result_tx.clone(),
            )));
        }
        drop(result_tx);

        let feeder_task = tokio::spawn(feed(
            intake_rx,
            shard_txs,
            Arc::clone(&gate),
            Arc::clone(&metrics),
        ));

        // Workers → output gate (fan-out, ack barrier). The gate also
        // flushes and closes the sinks once the result stream drains.
        let gate_task = tokio::spawn(output_gate(
            result_rx,
            sinks,
            ordered,
            Arc::clone(&metrics),
            good_key,
            pii_key,
            shutdown_timeout,
        ));

        // The output gate ends when the result stream drains: source end
        // or cancellation upstream, or its own fatal error.
        let gate_outcome = match gate_task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(PipelineError::TaskPanic(format!("output gate: {e}"))),
        };

        // Shutdown choreography from here, every step bounded.
        cancel.cancel();

        let mut failure: Option<PipelineError> = gate_outcome.err();

        // In-flight enrich work has already finished (the gate drained
        // the result stream); reap the worker and feeder tasks.
        for task in worker_tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "enrich worker panicked");
            }
        }
        if let Err(e) = feeder_task.await {
            warn!(error = %e, "feeder task panicked");
        }

        // Let the source release its resources and drain pending acks
        // (checkpoint commits).
        match tokio::time::timeout(shutdown_timeout, source_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                if failure.is_none() {
                    failure = Some(PipelineError::Source(e));
                }
            }
            Ok(Err(e)) => warn!(error = %e, "source task panicked"),
            Err(_) => warn!("source did not stop within the shutdown timeout"),
        }

        let snapshot = metrics.snapshot();
        info!(
            raw = snapshot.raw_count,
            good = snapshot.good_count,
            bad = snapshot.bad_count,
            "pipeline stopped"
        );

        match failure {
            None => Ok(()),
            Some(e) => {
                error!(error = %e, "pipeline failed");
                exception.report(&format!("pipeline failed: {e}"));
                Err(e)
            }
        }
    }
}

/// Pull from the intake channel, pass the pause gate, stamp sequence
/// numbers, and shard across the workers round-robin.
async fn feed(
    mut intake_rx: mpsc::Receiver<RawRecord>,
    shard_txs: Vec<mpsc::Sender<Job>>,
    gate: Arc<PauseGate>,
    metrics: Arc<PipelineMetrics>,
) {
    let mut seq = 0u64;
    while let Some(record) = intake_rx.recv().await {
        // Suspends here while an asset swap is in progress.
        let guard = gate.enter().await;
        metrics.record_raw();

        let shard = (seq as usize) % shard_txs.len();
        if shard_txs[shard]
            .send(Job { seq, record, guard })
            .await
            .is_err()
        {
            return;
        }
        seq += 1;
    }
    debug!(records = seq, "intake drained, feeder stopping");
}

/// One enrich worker: dispatch records from its shard, release the gate
/// guard, forward the completion.
async fn enrich_worker(
    mut shard_rx: mpsc::Receiver<Job>,
    dispatcher: Arc<Dispatcher>,
    result_tx: mpsc::Sender<Completed>,
) {
    while let Some(job) = shard_rx.recv().await {
        let result = dispatcher.dispatch(&job.record.data);
        drop(job.guard);

        let completed = Completed {
            seq: job.seq,
            ack: job.record.ack.clone(),
            result,
        };
        if result_tx.send(completed).await.is_err() {
            return;
        }
    }
}

/// The fan-out and ack barrier. Consumes completions (re-sequenced in
/// ordered mode), publishes every derived row, then acks the record.
/// Closes the sinks once the result stream drains; any error out of
/// here is fatal.
#[allow(clippy::too_many_arguments)]
async fn output_gate(
    mut result_rx: mpsc::Receiver<Completed>,
    sinks: PipelineSinks,
    ordered: bool,
    metrics: Arc<PipelineMetrics>,
    good_key: Option<PartitionKeyField>,
    pii_key: Option<PartitionKeyField>,
    close_timeout: Duration,
) -> Result<(), PipelineError> {
    let mut reorder: ReorderBuffer<Completed> = ReorderBuffer::new();

    let outcome = async {
        while let Some(completed) = result_rx.recv().await {
            let releasable = if ordered {
                reorder.push(completed.seq, completed)
            } else {
                vec![completed]
            };

            for item in releasable {
                publish_and_ack(&sinks, item, &metrics, good_key, pii_key).await?;
            }
        }
        Ok(())
    }
    .await;

    // Close the sinks regardless; on the error path queued records are
    // still flushed best-effort.
    let close_result = close_sinks(sinks, close_timeout).await;
    outcome.and(close_result)
}

async fn close_sinks(sinks: PipelineSinks, close_timeout: Duration) -> Result<(), PipelineError> {
    let PipelineSinks { good, pii, bad } = sinks;

    let mut result = close_one(good, close_timeout)
        .await
        .map_err(|e| PipelineError::sink("good", e));

    if let Some(pii) = pii {
        let closed = close_one(pii, close_timeout)
            .await
            .map_err(|e| PipelineError::sink("pii", e));
        if result.is_ok() {
            result = closed;
        }
    }

    // A bad row that could not be delivered is data loss.
    let closed = close_one(bad, close_timeout)
        .await
        .map_err(PipelineError::BadRowLost);
    if result.is_ok() {
        result = closed;
    }

    result
}

/// Close one sink under the shutdown timeout; a timeout is logged and
/// does not block the remaining steps.
async fn close_one(sink: Sink, close_timeout: Duration) -> Result<(), sluice_sinks::SinkError> {
    let name = sink.name().to_string();
    match tokio::time::timeout(close_timeout, sink.close()).await {
        Ok(Ok(_snapshot)) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            warn!(sink = %name, "sink did not flush within the shutdown timeout");
            Ok(())
        }
    }
}

/// Publish every row one record produced - good, pii and bad fan out
/// concurrently - then issue the record's single ack.
async fn publish_and_ack(
    sinks: &PipelineSinks,
    completed: Completed,
    metrics: &PipelineMetrics,
    good_key: Option<PartitionKeyField>,
    pii_key: Option<PartitionKeyField>,
) -> Result<(), PipelineError> {
    let Completed { ack, result, .. } = completed;

    let mut publishes: Vec<BoxFuture<'_, Result<(), PipelineError>>> = Vec::new();
    let mut good_rows = 0u64;
    let mut bad_rows = 0u64;

    for outcome in result.outcomes {
        match outcome {
            Outcome::Good(event) => {
                good_rows += 1;
                let data = attributed(&event, good_key, event.to_tsv().into_bytes());
                publishes.push(
                    async move {
                        sinks
                            .good
                            .publish(data)
                            .await
                            .map_err(|e| PipelineError::sink("good", e))
                    }
                    .boxed(),
                );
            }
            Outcome::Bad(row) => {
                bad_rows += 1;
                let data = AttributedData::new(row.to_json().into_bytes());
                publishes.push(
                    async move {
                        sinks
                            .bad
                            .publish(data)
                            .await
                            .map_err(PipelineError::BadRowLost)
                    }
                    .boxed(),
                );
            }
        }
    }

    if let Some(pii_sink) = &sinks.pii {
        for pii_event in result.pii_events {
            let data = attributed(&pii_event, pii_key, pii_event.to_tsv().into_bytes());
            publishes.push(
                async move {
                    pii_sink
                        .publish(data)
                        .await
                        .map_err(|e| PipelineError::sink("pii", e))
                }
                .boxed(),
            );
        }
    }

    for publish_result in join_all(publishes).await {
        publish_result?;
    }

    metrics.record_good(good_rows);
    metrics.record_bad(bad_rows);
    if let Some(latency) = result.latency_ms {
        metrics.set_latency_ms(latency);
    }

    // The ack barrier: every derived row is enqueued, commit the record.
    ack.ack();
    Ok(())
}

/// Attach the configured partition key when the event carries a value
/// for it.
fn attributed(
    event: &EnrichedEvent,
    key: Option<PartitionKeyField>,
    data: Vec<u8>,
) -> AttributedData {
    match key.and_then(|k| event.get(k.field_name()).map(|v| (k, v.to_owned()))) {
        Some((key, value)) => AttributedData::with_partition_key(data, key.field_name(), value),
        None => AttributedData::new(data),
    }
}
