//! Client and server configuration.
//!
//! Both structs deserialize from JSON with every field optional; missing
//! fields take the defaults below.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::codec::REQUEST_HEADER_SIZE;
use crate::error::{LinkError, Result};
use crate::protocol::MAX_PAYLOAD_SIZE;
use crate::writer::WriterConfig;

/// Default auto-send cadence.
pub const DEFAULT_AUTO_INTERVAL_MS: u32 = 3000;

/// Default time to wait for an ack after an auto-send.
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 5000;

/// Default delay before a reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// Default forced interval a server advertises once interval control is on.
pub const DEFAULT_FORCED_INTERVAL_MS: u32 = 3000;

/// Default bounded wait for each session on listener stop.
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 1000;

/// Default socket read chunk.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;

/// Client session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Auto-send cadence in milliseconds.
    #[serde(default = "default_auto_interval")]
    pub auto_interval_ms: u32,
    /// Ack wait after each auto-send.
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_ms: u64,
    /// Delay before reconnecting after transport loss.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Content sent on every auto-send tick. Empty disables sending.
    #[serde(default)]
    pub auto_payload: String,
    /// Start with auto-send enabled.
    #[serde(default)]
    pub auto_send: bool,
    /// Socket read chunk size.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    #[serde(default)]
    pub writer: WriterConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            auto_interval_ms: DEFAULT_AUTO_INTERVAL_MS,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            auto_payload: String::new(),
            auto_send: false,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            writer: WriterConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load and validate a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        require_nonzero("auto_interval_ms", u64::from(self.auto_interval_ms))?;
        require_nonzero("ack_timeout_ms", self.ack_timeout_ms)?;
        require_nonzero("reconnect_delay_ms", self.reconnect_delay_ms)?;
        require_nonzero("read_buffer_size", self.read_buffer_size as u64)?;

        let max_content = MAX_PAYLOAD_SIZE - REQUEST_HEADER_SIZE;
        if self.auto_payload.len() > max_content {
            return Err(LinkError::Config {
                message: format!(
                    "auto_payload is {} bytes, at most {} fit in one frame",
                    self.auto_payload.len(),
                    max_content
                ),
            });
        }
        Ok(())
    }

    /// Replace zero timings with their defaults, logging each fix.
    pub fn with_nonzero_timings(mut self) -> Self {
        if self.auto_interval_ms == 0 {
            tracing::warn!(default = DEFAULT_AUTO_INTERVAL_MS, "zero auto_interval_ms, using default");
            self.auto_interval_ms = DEFAULT_AUTO_INTERVAL_MS;
        }
        if self.ack_timeout_ms == 0 {
            tracing::warn!(default = DEFAULT_ACK_TIMEOUT_MS, "zero ack_timeout_ms, using default");
            self.ack_timeout_ms = DEFAULT_ACK_TIMEOUT_MS;
        }
        if self.reconnect_delay_ms == 0 {
            tracing::warn!(default = DEFAULT_RECONNECT_DELAY_MS, "zero reconnect_delay_ms, using default");
            self.reconnect_delay_ms = DEFAULT_RECONNECT_DELAY_MS;
        }
        self
    }

    pub fn auto_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.auto_interval_ms))
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Advertise `forced_interval_ms` in every ack.
    #[serde(default)]
    pub interval_control: bool,
    /// Interval carried by acks while interval control is on.
    #[serde(default = "default_forced_interval")]
    pub forced_interval_ms: u32,
    /// Bounded wait for each session when the listener stops.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,
    /// Socket read chunk size.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    #[serde(default)]
    pub writer: WriterConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            interval_control: false,
            forced_interval_ms: DEFAULT_FORCED_INTERVAL_MS,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            writer: WriterConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load and validate a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        require_nonzero("forced_interval_ms", u64::from(self.forced_interval_ms))?;
        require_nonzero("stop_timeout_ms", self.stop_timeout_ms)?;
        require_nonzero("read_buffer_size", self.read_buffer_size as u64)?;
        Ok(())
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| LinkError::Config {
        message: format!("Failed to read config file '{}': {}", path.display(), e),
    })?;

    serde_json::from_str(&content).map_err(|e| LinkError::Config {
        message: format!("Failed to parse config file '{}': {}", path.display(), e),
    })
}

fn require_nonzero(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(LinkError::Config {
            message: format!("{field} must be greater than zero"),
        });
    }
    Ok(())
}

fn default_auto_interval() -> u32 {
    DEFAULT_AUTO_INTERVAL_MS
}

fn default_ack_timeout() -> u64 {
    DEFAULT_ACK_TIMEOUT_MS
}

fn default_reconnect_delay() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

fn default_forced_interval() -> u32 {
    DEFAULT_FORCED_INTERVAL_MS
}

fn default_stop_timeout() -> u64 {
    DEFAULT_STOP_TIMEOUT_MS
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}
