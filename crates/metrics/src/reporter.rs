//! Periodic metrics reporter
//!
//! Drains counter deltas to every enabled backend on a fixed period.
//! Spawned once per pipeline; stops on cancellation after a final flush so
//! shutdown totals are not lost.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{MetricsDelta, MetricsSnapshot, PipelineMetrics};

/// One reporting destination.
#[async_trait]
pub trait MetricsBackend: Send {
    /// Publish one period's delta. Failures are the backend's problem to
    /// log; reporting must never stall the pipeline.
    async fn emit(&mut self, delta: &MetricsDelta);

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Human-readable backend writing through the process log.
#[derive(Debug, Default)]
pub struct StdoutBackend;

#[async_trait]
impl MetricsBackend for StdoutBackend {
    async fn emit(&mut self, delta: &MetricsDelta) {
        match delta.enrich_latency_ms {
            Some(latency) => info!(
                raw = delta.raw,
                good = delta.good,
                bad = delta.bad,
                enrich_latency_ms = latency,
                "pipeline metrics"
            ),
            None => info!(
                raw = delta.raw,
                good = delta.good,
                bad = delta.bad,
                "pipeline metrics"
            ),
        }
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// Periodic reporter over a set of backends.
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    backends: Vec<Box<dyn MetricsBackend>>,
    period: std::time::Duration,
    previous: MetricsSnapshot,
}

impl MetricsReporter {
    pub fn new(
        metrics: Arc<PipelineMetrics>,
        backends: Vec<Box<dyn MetricsBackend>>,
        period: std::time::Duration,
    ) -> Self {
        Self {
            metrics,
            backends,
            period,
            previous: MetricsSnapshot::default(),
        }
    }

    /// Run until cancelled. Spawn as a task.
    pub async fn run(mut self, cancel: CancellationToken) {
        if self.backends.is_empty() {
            info!("metrics reporting disabled");
            return;
        }

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let names: Vec<&str> = self.backends.iter().map(|b| b.name()).collect();
        info!(
            period_secs = self.period.as_secs(),
            backends = ?names,
            "metrics reporter started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // Final flush so shutdown-window counts are reported.
                    self.report().await;
                    info!("metrics reporter stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.report().await;
                }
            }
        }
    }

    async fn report(&mut self) {
        let snapshot = self.metrics.snapshot();
        let delta = snapshot.delta_since(&self.previous);
        self.previous = snapshot;

        for backend in &mut self.backends {
            backend.emit(&delta).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Recording {
        deltas: Arc<Mutex<Vec<MetricsDelta>>>,
    }

    #[async_trait]
    impl MetricsBackend for Recording {
        async fn emit(&mut self, delta: &MetricsDelta) {
            self.deltas.lock().unwrap().push(*delta);
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    #[tokio::test]
    async fn reports_deltas_not_totals() {
        let metrics = Arc::new(PipelineMetrics::new());
        let deltas = Arc::new(Mutex::new(Vec::new()));

        let reporter = MetricsReporter::new(
            Arc::clone(&metrics),
            vec![Box::new(Recording {
                deltas: Arc::clone(&deltas),
            })],
            Duration::from_millis(20),
        );

        let cancel = CancellationToken::new();
        let task = tokio::spawn(reporter.run(cancel.clone()));

        metrics.record_raw();
        metrics.record_good(2);
        tokio::time::sleep(Duration::from_millis(35)).await;

        metrics.record_raw();
        tokio::time::sleep(Duration::from_millis(25)).await;

        cancel.cancel();
        task.await.unwrap();

        let seen = deltas.lock().unwrap();
        let total_raw: u64 = seen.iter().map(|d| d.raw).sum();
        let total_good: u64 = seen.iter().map(|d| d.good).sum();
        assert_eq!(total_raw, 2, "deltas must sum to the counter total");
        assert_eq!(total_good, 2);
        assert!(
            seen.iter().all(|d| d.raw <= 2),
            "each period carries movement, not the running total"
        );
    }

    #[tokio::test]
    async fn no_backends_returns_immediately() {
        let reporter = MetricsReporter::new(
            Arc::new(PipelineMetrics::new()),
            Vec::new(),
            Duration::from_secs(10),
        );
        reporter.run(CancellationToken::new()).await;
    }
}
