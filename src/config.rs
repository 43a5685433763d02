//! Configuration loading and management.
//!
//! All knobs default to the values the server ships with, so running
//! without a config file is fully supported. A TOML file passed as the
//! first CLI argument overrides individual sections:
//!
//! ```toml
//! [server]
//! address = "0.0.0.0:9090"
//!
//! [session]
//! pong_wait_secs = 30
//! ```

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Per-connection session settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Room event-loop settings.
    #[serde(default)]
    pub room: RoomConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to.
    #[serde(default = "default_address")]
    pub address: SocketAddr,
    /// Grace period for draining connections and rooms on shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

/// Per-connection session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// How long the reader waits for traffic (refreshed by pongs) before
    /// declaring the peer dead.
    #[serde(default = "default_pong_wait")]
    pub pong_wait_secs: u64,
    /// Per-frame write deadline.
    #[serde(default = "default_write_wait")]
    pub write_wait_secs: u64,
    /// Capacity of the per-session outbound sink.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
}

impl SessionConfig {
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Transport pings go out at 90% of the pong wait so a live peer always
    /// has a pong in flight before the read deadline expires.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pong_wait_secs: default_pong_wait(),
            write_wait_secs: default_write_wait(),
            outbound_capacity: default_outbound_capacity(),
        }
    }
}

/// Room event-loop configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    /// Capacity of each room's event mailbox. Sized to absorb bursts of
    /// joins and broadcasts without stalling producers.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_shutdown_grace() -> u64 {
    30
}

fn default_pong_wait() -> u64 {
    60
}

fn default_write_wait() -> u64 {
    10
}

fn default_outbound_capacity() -> usize {
    32
}

fn default_mailbox_capacity() -> usize {
    128
}
