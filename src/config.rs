//! Transfer configuration
//!
//! Loaded from a JSON file; every field is optional and falls back to the
//! defaults the bootloader was tuned against (115200 baud, 2 s reads).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferConfig {
    pub baud_rate: u32,
    /// Timeout for each blocking serial read
    pub read_timeout_ms: u64,
    /// Maximum reads while waiting for the handshake echo
    pub handshake_attempts: u32,
    /// Wall-clock bound on the whole handshake
    pub handshake_timeout_ms: u64,
    /// Pause before and after each frame acknowledgment
    pub frame_delay_ms: u64,
    /// Host-side downgrade floor; ignored in debug mode
    pub minimum_version: Option<u16>,
    /// Wait for an acknowledgment after the end-of-stream frame
    pub confirm_commit: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout_ms: 2_000,
            handshake_attempts: 32,
            handshake_timeout_ms: 10_000,
            frame_delay_ms: 100,
            minimum_version: None,
            confirm_commit: false,
        }
    }
}

impl TransferConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "baud_rate",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "read_timeout_ms",
                reason: "a zero timeout turns every read into a poll".to_string(),
            });
        }
        if self.handshake_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "handshake_attempts",
                reason: "at least one read is needed to see the echo".to_string(),
            });
        }
        if self.handshake_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "handshake_timeout_ms",
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(self.frame_delay_ms)
    }
}
