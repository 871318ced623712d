//! Output (sink) configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::ConfigError;

/// The three pipeline outputs. `pii` is optional; without it no pii events
/// are derived.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputsConfig {
    pub good: OutputConfig,
    pub pii: Option<OutputConfig>,
    pub bad: OutputConfig,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            good: OutputConfig::default(),
            pii: None,
            bad: OutputConfig::default(),
        }
    }
}

impl OutputsConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        self.good.validate("output.good")?;
        self.bad.validate("output.bad")?;
        if let Some(pii) = &self.pii {
            pii.validate("output.pii")?;
        }
        Ok(())
    }
}

/// One sink: a target plus batching and retry settings.
//
// No deny_unknown_fields here: it cannot be combined with the flattened
// target enum.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    #[serde(flatten)]
    pub target: OutputTarget,

    /// Canonical event field used as the partition key. Records without a
    /// value for it (and bad rows) get a random key.
    pub partition_key: Option<PartitionKeyField>,

    /// Flush when the oldest buffered record is this old.
    #[serde(with = "humantime_serde")]
    pub delay_threshold: Duration,

    /// Flush when this many records are buffered.
    pub max_batch_size: usize,

    /// Flush when the buffer holds this many payload bytes.
    pub max_batch_bytes: usize,

    /// Per-record payload ceiling; serialized events above it are demoted
    /// to size-violation bad rows before they reach this sink.
    pub record_byte_limit: usize,

    pub backoff_policy: BackoffPolicy,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            target: OutputTarget::Stdout,
            partition_key: None,
            delay_threshold: Duration::from_millis(200),
            max_batch_size: 500,
            max_batch_bytes: 5 * 1024 * 1024,
            record_byte_limit: 6_900_000,
            backoff_policy: BackoffPolicy::default(),
        }
    }
}

impl OutputConfig {
    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::invalid(format!(
                "{section}.max_batch_size must be at least 1"
            )));
        }
        if self.max_batch_bytes == 0 {
            return Err(ConfigError::invalid(format!(
                "{section}.max_batch_bytes must be at least 1"
            )));
        }
        if self.record_byte_limit == 0 {
            return Err(ConfigError::invalid(format!(
                "{section}.record_byte_limit must be at least 1"
            )));
        }
        if self.backoff_policy.min_backoff > self.backoff_policy.max_backoff {
            return Err(ConfigError::invalid(format!(
                "{section}.backoff_policy: min_backoff exceeds max_backoff"
            )));
        }
        match &self.target {
            OutputTarget::Tcp { target } if target.is_empty() => Err(ConfigError::invalid(
                format!("{section}.target must not be empty"),
            )),
            OutputTarget::File { path } if path.as_os_str().is_empty() => Err(
                ConfigError::invalid(format!("{section}.path must not be empty")),
            ),
            _ => Ok(()),
        }
    }
}

/// Where a sink delivers its records.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputTarget {
    /// Framed records to a remote collector, `host:port`.
    Tcp { target: String },
    /// Framed records appended to a local stream file.
    File { path: PathBuf },
    /// One record per line on standard output.
    Stdout,
}

/// Canonical fields allowed as partition keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionKeyField {
    EventId,
    EventFingerprint,
    DomainUserid,
    NetworkUserid,
    UserIpaddress,
    DomainSessionid,
    UserFingerprint,
}

impl PartitionKeyField {
    /// The canonical event field name this key reads from.
    pub fn field_name(&self) -> &'static str {
        match self {
            PartitionKeyField::EventId => "event_id",
            PartitionKeyField::EventFingerprint => "event_fingerprint",
            PartitionKeyField::DomainUserid => "domain_userid",
            PartitionKeyField::NetworkUserid => "network_userid",
            PartitionKeyField::UserIpaddress => "user_ipaddress",
            PartitionKeyField::DomainSessionid => "domain_sessionid",
            PartitionKeyField::UserFingerprint => "user_fingerprint",
        }
    }
}

/// Capped exponential backoff for sink publish retries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffPolicy {
    #[serde(with = "humantime_serde")]
    pub min_backoff: Duration,

    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }
}
