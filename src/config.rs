//! Configuration management
//!
//! Tunnel parameters are carried in an explicit [`Config`] value instead of
//! process globals. Everything has a default, so a configuration file is
//! optional and may set only the fields it cares about.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::protocol::ProtocolIdentity;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tunnel: TunnelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Parameters shared by the dial and accept paths
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelConfig {
    /// Protocol identity advertised in the `Upgrade` header
    #[serde(default)]
    pub protocol: ProtocolIdentity,
    /// Timeout for dialing a tunnel endpoint or TCP target, in seconds
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_secs: u64,
    /// User agent sent by the dial path
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl TunnelConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolIdentity::default(),
            dial_timeout_secs: default_dial_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_dial_timeout() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("hpipe/{}", crate::VERSION)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config =
            toml::from_str(&contents).with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.tunnel.protocol.validate()?;
        if self.tunnel.dial_timeout_secs == 0 {
            anyhow::bail!("tunnel.dial_timeout_secs must be > 0");
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            anyhow::bail!(
                "logging.format must be \"json\" or \"pretty\", got {:?}",
                self.logging.format
            );
        }
        Ok(())
    }
}
