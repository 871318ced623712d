//! Sluice - Configuration
//!
//! One hierarchical TOML document configures a pipeline instance:
//!
//! ```toml
//! [input]
//! type = "file"
//! path = "streams/raw.frames"
//! initial_position = "TRIM_HORIZON"
//!
//! [output.good]
//! type = "tcp"
//! target = "collector.internal:7402"
//! partition_key = "domain_userid"
//!
//! [output.bad]
//! type = "file"
//! path = "streams/bad.frames"
//!
//! [[enrichments]]
//! type = "event_fingerprint"
//!
//! [monitoring.metrics]
//! period = "10s"
//! stdout = true
//! ```
//!
//! Every section has working defaults; `Config::default()` is a runnable
//! stdin-less pipeline writing to stdout. All durations use humantime
//! strings (`"200ms"`, `"7d"`).

mod enrichments;
mod error;
mod input;
mod monitoring;
mod output;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

pub use enrichments::EnrichmentConfig;
pub use error::ConfigError;
pub use input::{CheckpointSettings, InitialPosition, InputConfig};
pub use monitoring::{ExceptionConfig, MetricsConfig, MonitoringConfig, StatsdConfig};
pub use output::{BackoffPolicy, OutputConfig, OutputTarget, OutputsConfig, PartitionKeyField};

/// Root configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub input: InputConfig,
    pub output: OutputsConfig,
    pub enrichments: Vec<EnrichmentConfig>,
    pub assets: AssetsConfig,
    pub monitoring: MonitoringConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&text)
    }

    /// Parse and validate a configuration document.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation beyond what serde enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.input.validate()?;
        self.output.validate()?;
        for enrichment in &self.enrichments {
            enrichment.validate()?;
        }
        self.pipeline.validate()?;
        Ok(())
    }
}

/// Asset manager settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetsConfig {
    /// How often enrichment assets are re-fetched.
    #[serde(with = "humantime_serde")]
    pub update_period: Duration,

    /// Directory where fetched assets are installed.
    pub directory: std::path::PathBuf,

    /// Per-file fetch timeout.
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            update_period: Duration::from_secs(7 * 24 * 60 * 60),
            directory: "assets".into(),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// Runtime concurrency settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Parallel enrich workers.
    pub concurrency: usize,

    /// Preserve ingestion order through the enrich stage.
    ///
    /// Costs head-of-line blocking; leave off unless a downstream consumer
    /// is order-sensitive.
    pub ordered: bool,

    /// Per-stage timeout during shutdown.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 64,
            ordered: false,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("pipeline.concurrency must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
