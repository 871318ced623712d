//! Sluice - Metrics & Error Reporting
//!
//! Three counters and one gauge describe the whole pipeline:
//!
//! - `raw_count` - records pulled from the source
//! - `good_count` - enriched events accepted by the good sink
//! - `bad_count` - bad rows accepted by the bad sink
//! - `enrich_latency_ms` - collector-to-enrich latency, when the payload
//!   carried a collector timestamp
//!
//! Counters are shared atomics; the [`MetricsReporter`] drains deltas to
//! the enabled backends (stdout, statsd) on a fixed period. Exception
//! forwarding is separate and immediate: see [`ExceptionReporter`].

mod exception;
mod reporter;
mod statsd;

use std::sync::atomic::{AtomicU64, Ordering};

pub use exception::{ExceptionReporter, LogReporter, SharedExceptionReporter, WebhookReporter};
pub use reporter::{MetricsBackend, MetricsReporter, StdoutBackend};
pub use statsd::StatsdBackend;

/// Sentinel for "no latency observed yet".
const LATENCY_UNSET: u64 = u64::MAX;

/// Shared pipeline counters. Cheap to clone via `Arc`.
#[derive(Debug)]
pub struct PipelineMetrics {
    raw_count: AtomicU64,
    good_count: AtomicU64,
    bad_count: AtomicU64,
    enrich_latency_ms: AtomicU64,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub const fn new() -> Self {
        Self {
            raw_count: AtomicU64::new(0),
            good_count: AtomicU64::new(0),
            bad_count: AtomicU64::new(0),
            enrich_latency_ms: AtomicU64::new(LATENCY_UNSET),
        }
    }

    /// Record one raw record pulled from the source.
    #[inline]
    pub fn record_raw(&self) {
        self.raw_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record enriched events accepted by the good sink.
    #[inline]
    pub fn record_good(&self, count: u64) {
        self.good_count.fetch_add(count, Ordering::Relaxed);
    }

    /// Record bad rows accepted by the bad sink.
    #[inline]
    pub fn record_bad(&self, count: u64) {
        self.bad_count.fetch_add(count, Ordering::Relaxed);
    }

    /// Set the latest observed collector-to-enrich latency.
    #[inline]
    pub fn set_latency_ms(&self, millis: u64) {
        // Clamp below the sentinel; a latency this large is meaningless
        // anyway.
        self.enrich_latency_ms
            .store(millis.min(LATENCY_UNSET - 1), Ordering::Relaxed);
    }

    /// Point-in-time view of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.enrich_latency_ms.load(Ordering::Relaxed);
        MetricsSnapshot {
            raw_count: self.raw_count.load(Ordering::Relaxed),
            good_count: self.good_count.load(Ordering::Relaxed),
            bad_count: self.bad_count.load(Ordering::Relaxed),
            enrich_latency_ms: if latency == LATENCY_UNSET {
                None
            } else {
                Some(latency)
            },
        }
    }
}

/// Point-in-time snapshot of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub raw_count: u64,
    pub good_count: u64,
    pub bad_count: u64,
    pub enrich_latency_ms: Option<u64>,
}

impl MetricsSnapshot {
    /// Counter movement since `previous`. The gauge carries the current
    /// value, not a delta.
    pub fn delta_since(&self, previous: &MetricsSnapshot) -> MetricsDelta {
        MetricsDelta {
            raw: self.raw_count.saturating_sub(previous.raw_count),
            good: self.good_count.saturating_sub(previous.good_count),
            bad: self.bad_count.saturating_sub(previous.bad_count),
            enrich_latency_ms: self.enrich_latency_ms,
        }
    }
}

/// One reporting period's counter movement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsDelta {
    pub raw: u64,
    pub good: u64,
    pub bad: u64,
    pub enrich_latency_ms: Option<u64>,
}

impl MetricsDelta {
    /// True when nothing moved and no latency is known; backends may skip
    /// such periods.
    pub fn is_idle(&self) -> bool {
        self.raw == 0 && self.good == 0 && self.bad == 0 && self.enrich_latency_ms.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counter_movement() {
        let metrics = PipelineMetrics::new();
        metrics.record_raw();
        metrics.record_raw();
        metrics.record_good(3);
        metrics.record_bad(1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.raw_count, 2);
        assert_eq!(snapshot.good_count, 3);
        assert_eq!(snapshot.bad_count, 1);
        assert_eq!(snapshot.enrich_latency_ms, None);
    }

    #[test]
    fn latency_gauge_is_nullable() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.snapshot().enrich_latency_ms, None);

        metrics.set_latency_ms(42);
        assert_eq!(metrics.snapshot().enrich_latency_ms, Some(42));
    }

    #[test]
    fn delta_subtracts_the_previous_snapshot() {
        let metrics = PipelineMetrics::new();
        metrics.record_raw();
        metrics.record_good(1);
        let first = metrics.snapshot();

        metrics.record_raw();
        metrics.record_raw();
        metrics.record_bad(5);
        let second = metrics.snapshot();

        let delta = second.delta_since(&first);
        assert_eq!(delta.raw, 2);
        assert_eq!(delta.good, 0);
        assert_eq!(delta.bad, 5);
    }

    #[test]
    fn idle_delta_detected() {
        let snapshot = MetricsSnapshot::default();
        assert!(snapshot.delta_since(&snapshot).is_idle());
    }
}
