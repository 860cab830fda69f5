//! Server configuration
//!
//! Loaded from an optional JSON file, then overridden by command line flags.
//! Every field has a default so an empty object `{}` is a valid config.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

/// What a session does when the line-event queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backpressure {
    /// Wait for the dispatcher to make room
    #[default]
    Block,
    /// Drop the line and log it
    DropNewest,
}

/// Runtime settings for the relay
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, `ip:port`
    pub addr: String,
    /// Seconds a session may stay silent before it is evicted
    pub idle_timeout_secs: u64,
    /// Capacity of each event queue
    pub queue_capacity: usize,
    /// Full-queue policy for line events
    pub backpressure: Backpressure,
    /// Upper bound on a single write to one session
    pub write_timeout_ms: u64,
    /// Longest accepted inbound line in bytes, terminator excluded
    pub max_line_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8888".to_string(),
            idle_timeout_secs: 10,
            queue_capacity: 5,
            backpressure: Backpressure::Block,
            write_timeout_ms: 2000,
            max_line_len: 4096,
        }
    }
}

impl ServerConfig {
    /// Parse a config from JSON text
    pub fn from_json(text: &str) -> Result<Self, AppError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()
    }

    /// Read and parse a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Reject values the runtime cannot work with
    pub fn validate(self) -> Result<Self, AppError> {
        if self.queue_capacity == 0 {
            return Err(AppError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.idle_timeout_secs == 0 {
            return Err(AppError::InvalidConfig(
                "idle_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.max_line_len == 0 {
            return Err(AppError::InvalidConfig(
                "max_line_len must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
