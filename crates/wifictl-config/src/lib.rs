#![deny(unsafe_code)]

//! Configuration loading and validation for wifictl.
//!
//! Loads TOML configuration files and validates them against the bounds the
//! control-socket layer enforces. [`AppConfig`] is the central configuration
//! structure; [`limits`] holds the protocol bounds shared with `wifictl-core`.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Protocol bounds shared by the config validator and the control-socket client.
pub mod limits {
    /// Smallest accepted reply buffer, in bytes.
    pub const MIN_MSG_LEN: usize = 4096;
    /// Reply buffer used unless configured otherwise.
    pub const DEFAULT_MSG_LEN: usize = 12288;
    /// Largest accepted reply buffer, in bytes.
    pub const MAX_MSG_LEN: usize = 65536;
    /// Default (and minimum) synchronous command timeout.
    pub const DEFAULT_CMD_TIMEOUT_MS: u64 = 1000;
    /// Delay before the first reconnect tick after `connect()`.
    pub const FIRST_DELAY_MS: u64 = 100;
    /// Interval between reconnect ticks.
    pub const RETRY_DELAY_MS: u64 = 1000;
    /// Reconnect ticks before the manager gives up.
    pub const MAX_CONNECTION_ATTEMPTS: u32 = 10;
    /// Directory client-side sockets are bound under.
    pub const DEFAULT_CLIENT_DIR: &str = "/var/run/wifictl";
}

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Control-socket client settings.
    #[serde(default)]
    pub ctrl: CtrlConfig,

    /// Reconnect manager timing.
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Socket name to logical interface name aliases, consulted when a
    /// discovered socket does not match any interface by name.
    #[serde(default)]
    pub links: BTreeMap<String, String>,

    /// External daemons whose control sockets are managed.
    #[serde(default)]
    pub daemons: Vec<DaemonConfig>,
}

/// Control-socket client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtrlConfig {
    /// Directory the client-side sockets are bound in.
    #[serde(default = "default_client_dir")]
    pub client_dir: String,

    /// Reply buffer size in bytes.
    #[serde(default = "default_max_msg_len")]
    pub max_msg_len: usize,

    /// Timeout for synchronous commands issued from the CLI.
    #[serde(default = "default_cmd_timeout_ms")]
    pub cmd_timeout_ms: u64,
}

impl Default for CtrlConfig {
    fn default() -> Self {
        Self {
            client_dir: default_client_dir(),
            max_msg_len: default_max_msg_len(),
            cmd_timeout_ms: default_cmd_timeout_ms(),
        }
    }
}

fn default_client_dir() -> String {
    limits::DEFAULT_CLIENT_DIR.to_string()
}

fn default_max_msg_len() -> usize {
    limits::DEFAULT_MSG_LEN
}

fn default_cmd_timeout_ms() -> u64 {
    limits::DEFAULT_CMD_TIMEOUT_MS
}

/// Reconnect timer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Delay before the first discovery tick.
    #[serde(default = "default_first_delay_ms")]
    pub first_delay_ms: u64,

    /// Interval between discovery ticks.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Ticks without full readiness before the manager stops retrying.
    #[serde(default = "default_max_connection_attempts")]
    pub max_connection_attempts: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            first_delay_ms: default_first_delay_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_connection_attempts: default_max_connection_attempts(),
        }
    }
}

fn default_first_delay_ms() -> u64 {
    limits::FIRST_DELAY_MS
}

fn default_retry_delay_ms() -> u64 {
    limits::RETRY_DELAY_MS
}

fn default_max_connection_attempts() -> u32 {
    limits::MAX_CONNECTION_ATTEMPTS
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One external daemon (hostapd, wpa_supplicant, ...) and the interfaces it serves.
///
/// ## TOML Example
///
/// ```toml
/// [[daemons]]
/// name = "hostapd"
/// ctrl_dir = "/var/run/hostapd"
///
/// [[daemons.interfaces]]
/// name = "wlan0"
///
/// [[daemons.interfaces]]
/// name = "wlan1"
/// sock_name = "wlan1.0"
/// enabled = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Unique label used in logs.
    pub name: String,

    /// Directory the daemon creates its control sockets in.
    pub ctrl_dir: String,

    /// Interfaces expected on this daemon.
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
}

/// A logical interface bound to one control socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Logical interface name.
    pub name: String,

    /// Control socket name, when it differs from `name`.
    #[serde(default)]
    pub sock_name: Option<String>,

    /// Whether the manager should open this interface.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl InterfaceConfig {
    /// The control socket name, falling back to the interface name.
    pub fn sock_name(&self) -> &str {
        self.sock_name.as_deref().unwrap_or(&self.name)
    }
}

fn default_enabled() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        debug!(path = %path.display(), bytes = content.len(), "loaded config file");
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ctrl.client_dir.is_empty() {
            return Err(ConfigError::Validation(
                "ctrl.client_dir must not be empty".to_string(),
            ));
        }
        if !(limits::MIN_MSG_LEN..=limits::MAX_MSG_LEN).contains(&self.ctrl.max_msg_len) {
            return Err(ConfigError::Validation(format!(
                "ctrl.max_msg_len must be in [{}, {}], got {}",
                limits::MIN_MSG_LEN,
                limits::MAX_MSG_LEN,
                self.ctrl.max_msg_len
            )));
        }
        if self.ctrl.cmd_timeout_ms < limits::DEFAULT_CMD_TIMEOUT_MS {
            return Err(ConfigError::Validation(format!(
                "ctrl.cmd_timeout_ms must be at least {}, got {}",
                limits::DEFAULT_CMD_TIMEOUT_MS,
                self.ctrl.cmd_timeout_ms
            )));
        }

        if self.manager.first_delay_ms == 0 || self.manager.retry_delay_ms == 0 {
            return Err(ConfigError::Validation(
                "manager delays must be non-zero".to_string(),
            ));
        }
        if self.manager.max_connection_attempts == 0 {
            return Err(ConfigError::Validation(
                "manager.max_connection_attempts must be at least 1".to_string(),
            ));
        }

        for (sock, link) in &self.links {
            if sock.is_empty() || link.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "links entry {sock:?} = {link:?} must not be empty"
                )));
            }
        }

        let mut daemon_names = HashSet::new();
        for (i, daemon) in self.daemons.iter().enumerate() {
            if daemon.name.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "daemons[{i}].name must not be empty"
                )));
            }
            if !daemon_names.insert(daemon.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "daemons[{i}].name {:?} is duplicated",
                    daemon.name
                )));
            }
            if daemon.ctrl_dir.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "daemons[{i}].ctrl_dir must not be empty"
                )));
            }

            let mut iface_names = HashSet::new();
            for (j, iface) in daemon.interfaces.iter().enumerate() {
                if iface.name.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "daemons[{i}].interfaces[{j}].name must not be empty"
                    )));
                }
                if iface.sock_name.as_deref() == Some("") {
                    return Err(ConfigError::Validation(format!(
                        "daemons[{i}].interfaces[{j}].sock_name must not be empty"
                    )));
                }
                if !iface_names.insert(iface.name.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "daemons[{i}].interfaces[{j}].name {:?} is duplicated",
                        iface.name
                    )));
                }
            }
        }

        Ok(())
    }
}
