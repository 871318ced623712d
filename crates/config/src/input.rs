//! Input (source) configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::ConfigError;

/// Where raw records come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputConfig {
    /// Replayable framed log on local disk, with offset checkpointing.
    File {
        path: PathBuf,

        /// Where to start when no checkpoint exists.
        #[serde(default)]
        initial_position: InitialPosition,

        #[serde(default)]
        checkpoint_settings: CheckpointSettings,
    },

    /// Length-prefixed frames over inbound TCP connections.
    Tcp {
        #[serde(default = "default_bind_address")]
        address: String,
        port: u16,
    },

    /// Framed records from standard input. Useful for one-shot runs and
    /// debugging; acks are no-ops.
    Stdin,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig::Stdin
    }
}

impl InputConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        match self {
            InputConfig::File { path, checkpoint_settings, .. } => {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::invalid("input.path must not be empty"));
                }
                if checkpoint_settings.max_batch_size == 0 {
                    return Err(ConfigError::invalid(
                        "input.checkpoint_settings.max_batch_size must be at least 1",
                    ));
                }
                Ok(())
            }
            InputConfig::Tcp { address, .. } => {
                if address.is_empty() {
                    return Err(ConfigError::invalid("input.address must not be empty"));
                }
                Ok(())
            }
            InputConfig::Stdin => Ok(()),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Where a checkpoint-less source starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InitialPosition {
    /// Earliest retained record.
    #[default]
    TrimHorizon,
    /// Current tail of the stream.
    Latest,
}

/// How acknowledged offsets are batched before being committed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckpointSettings {
    /// Commit after this many acknowledgements.
    pub max_batch_size: usize,

    /// Commit at least this often while acknowledgements are pending.
    #[serde(with = "humantime_serde")]
    pub max_batch_wait: Duration,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            max_batch_size: 500,
            max_batch_wait: Duration::from_secs(10),
        }
    }
}
