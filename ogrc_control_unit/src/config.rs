//! Service configuration: one TOML document with `[shared]`, `[server]` and
//! the calibration sections.
//!
//! The core never reads files. `load_config` is called once by the binary
//! and the validated values are handed to [`crate::runtime::Rotator`] and
//! [`crate::server::Server`].

use std::path::Path;

use ogrc_common::config::{ConfigError, ConfigLoader, SharedConfig};
use ogrc_common::consts::{DEFAULT_BIND_ADDRESS, DEFAULT_PORT};
use ogrc_common::rotator::CalibrationConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ─── Server ─────────────────────────────────────────────────────────

/// GS-232 listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Depth of the global command queue.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_queue_depth() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string for the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.bind_address.is_empty() {
            return Err("server.bind_address cannot be empty".into());
        }
        if self.queue_depth == 0 {
            return Err("server.queue_depth must be > 0".into());
        }
        Ok(())
    }
}

// ─── Complete document ──────────────────────────────────────────────

/// Everything the `ogrc` binary reads from its configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlUnitConfig {
    #[serde(default)]
    pub shared: SharedConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(flatten)]
    pub calibration: CalibrationConfig,
}

impl ControlUnitConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.server
            .validate()
            .map_err(ConfigError::ValidationError)?;
        self.calibration.validate()
    }
}

/// Load and validate the configuration file.
///
/// A missing file yields the built-in defaults; a malformed or invalid file
/// is an error.
pub fn load_config(path: &Path) -> Result<ControlUnitConfig, ConfigError> {
    let config = ControlUnitConfig::load_or_default(path)?;
    config.validate()?;
    debug!(?config, "configuration validated");
    Ok(config)
}

/// Parse and validate a configuration from a TOML string.
pub fn load_config_from_str(content: &str) -> Result<ControlUnitConfig, ConfigError> {
    let config = ControlUnitConfig::from_toml(content)?;
    config.validate()?;
    Ok(config)
}
