//! Monitoring configuration: metrics reporters and the exception sink

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

/// Top-level monitoring section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitoringConfig {
    pub metrics: MetricsConfig,
    pub exception: Option<ExceptionConfig>,
}

/// Metrics reporting; any subset of backends may be enabled.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Reporting period shared by all backends.
    #[serde(with = "humantime_serde")]
    pub period: Duration,

    /// Human-readable line through the process log.
    pub stdout: bool,

    /// Tagged statsd datagrams over UDP.
    pub statsd: Option<StatsdConfig>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(10),
            stdout: true,
            statsd: None,
        }
    }
}

impl MetricsConfig {
    /// True if at least one backend is enabled.
    pub fn any_enabled(&self) -> bool {
        self.stdout || self.statsd.is_some()
    }
}

/// Statsd backend settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatsdConfig {
    pub host: String,
    pub port: u16,

    /// Extra tags attached to every datagram.
    pub tags: BTreeMap<String, String>,

    /// Metric name prefix.
    pub prefix: String,
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8125,
            tags: BTreeMap::new(),
            prefix: "sluice".into(),
        }
    }
}

/// Exception sink: non-fatal runtime errors and fatal errors are posted
/// here once, immediately, best-effort.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExceptionConfig {
    /// HTTP endpoint receiving a JSON body per reported error.
    pub endpoint: String,
}
