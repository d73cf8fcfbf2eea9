//! Configuration for the chat server.
//!
//! Values are layered, later layers winning:
//!
//! 1. built-in defaults,
//! 2. an optional TOML file,
//! 3. environment variables:
//!    - `CHAT_BIND_ADDR`               (default: "0.0.0.0")
//!    - `CHAT_PORT`                    (default: "4567")
//!    - `CHAT_CONFIRMATION_TIMEOUT_MS` (default: "250")
//!    - `CHAT_MAX_RETRANSMISSIONS`     (default: "3")
//!    - `CHAT_QUEUE_CAPACITY`          (default: "1024")
//!    - `CHAT_OUTBOX_CAPACITY`         (default: "256")
//!    - `CHAT_WRITE_TIMEOUT_MS`        (default: "5000")
//!    - `CHAT_MAX_FRAME_LEN`           (default: "4096")
//!    - `CHAT_SHUTDOWN_GRACE_MS`       (default: "1000")
//! 4. command-line flags (see `main.rs`).
//!
//! The configuration is immutable once the server starts.

use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::session::datagram::Reliability;

/// Per-attempt acknowledgment wait, as a multiple of the confirmation timeout.
pub const ACK_WAIT_FACTOR: u32 = 4;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// Port for both the TCP and the UDP listener.
    pub port: u16,

    /// Base confirmation interval for datagram acknowledgments.
    pub confirmation_timeout_ms: u64,

    /// Retransmissions after the first datagram attempt.
    pub max_retransmissions: u32,

    /// Capacity of the inbound and broadcast queues.
    pub queue_capacity: usize,

    /// Messages a single session may have waiting for its writer. A peer
    /// that falls further behind is disconnected.
    pub outbox_capacity: usize,

    /// Longest a single stream write may block before the peer is dropped.
    pub write_timeout_ms: u64,

    /// Longest accepted stream frame, delimiter excluded.
    pub max_frame_len: usize,

    /// How long shutdown waits for goodbyes to be delivered.
    pub shutdown_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: 4567,
            confirmation_timeout_ms: 250,
            max_retransmissions: 3,
            queue_capacity: 1024,
            outbox_capacity: 256,
            write_timeout_ms: 5000,
            max_frame_len: chat_protocol::framing::DEFAULT_MAX_FRAME_LEN,
            shutdown_grace_ms: 1000,
        }
    }
}

impl Config {
    /// Construct a `Config` from environment variables, falling back
    /// to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::default().with_env()
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_toml_str(&text)
    }

    /// Overlay process environment variables.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_env_from(|key| env::var(key).ok())
    }

    /// Overlay variables from an arbitrary lookup.
    pub fn with_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("CHAT_BIND_ADDR") {
            self.bind_addr = addr;
        }
        read_var(&lookup, "CHAT_PORT", &mut self.port)?;
        read_var(&lookup, "CHAT_CONFIRMATION_TIMEOUT_MS", &mut self.confirmation_timeout_ms)?;
        read_var(&lookup, "CHAT_MAX_RETRANSMISSIONS", &mut self.max_retransmissions)?;
        read_var(&lookup, "CHAT_QUEUE_CAPACITY", &mut self.queue_capacity)?;
        read_var(&lookup, "CHAT_OUTBOX_CAPACITY", &mut self.outbox_capacity)?;
        read_var(&lookup, "CHAT_WRITE_TIMEOUT_MS", &mut self.write_timeout_ms)?;
        read_var(&lookup, "CHAT_MAX_FRAME_LEN", &mut self.max_frame_len)?;
        read_var(&lookup, "CHAT_SHUTDOWN_GRACE_MS", &mut self.shutdown_grace_ms)?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be at least 1"));
        }
        if self.outbox_capacity == 0 {
            return Err(ConfigError::Invalid("outbox_capacity must be at least 1"));
        }
        if self.write_timeout_ms == 0 {
            return Err(ConfigError::Invalid("write_timeout_ms must be at least 1"));
        }
        if self.confirmation_timeout_ms == 0 {
            return Err(ConfigError::Invalid("confirmation_timeout_ms must be at least 1"));
        }
        if self.max_frame_len == 0 {
            return Err(ConfigError::Invalid("max_frame_len must be at least 1"));
        }
        Ok(())
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// How long one datagram attempt waits for its acknowledgment.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms) * ACK_WAIT_FACTOR
    }

    pub fn reliability(&self) -> Reliability {
        Reliability {
            ack_timeout: self.ack_timeout(),
            max_retransmissions: self.max_retransmissions,
        }
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn read_var<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = lookup(key) {
        *slot = value.trim().parse::<T>().map_err(|e| ConfigError::Env {
            key,
            reason: e.to_string(),
            value,
        })?;
    }
    Ok(())
}
