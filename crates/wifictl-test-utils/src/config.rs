//! Fluent [`AppConfig`] construction for tests.

use std::path::Path;

use wifictl_config::{AppConfig, DaemonConfig, InterfaceConfig};

/// Builds an [`AppConfig`] with short manager delays so reconnect cycles
/// finish quickly in tests.
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .client_dir(tmp.path().join("client"))
///     .daemon("hostapd", tmp.path().join("hostapd"), &["wlan0", "wlan1"])
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.manager.first_delay_ms = 1;
        config.manager.retry_delay_ms = 10;
        Self { config }
    }

    pub fn client_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.ctrl.client_dir = dir.as_ref().display().to_string();
        self
    }

    pub fn max_msg_len(mut self, len: usize) -> Self {
        self.config.ctrl.max_msg_len = len;
        self
    }

    pub fn delays_ms(mut self, first: u64, retry: u64) -> Self {
        self.config.manager.first_delay_ms = first;
        self.config.manager.retry_delay_ms = retry;
        self
    }

    pub fn max_connection_attempts(mut self, n: u32) -> Self {
        self.config.manager.max_connection_attempts = n;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    /// Map socket `sock` to logical interface `iface`.
    pub fn link(mut self, sock: &str, iface: &str) -> Self {
        self.config.links.insert(sock.to_string(), iface.to_string());
        self
    }

    /// Add a daemon whose interfaces use their own names as socket names.
    pub fn daemon(mut self, name: &str, ctrl_dir: impl AsRef<Path>, interfaces: &[&str]) -> Self {
        self.config.daemons.push(DaemonConfig {
            name: name.to_string(),
            ctrl_dir: ctrl_dir.as_ref().display().to_string(),
            interfaces: interfaces
                .iter()
                .map(|i| InterfaceConfig {
                    name: i.to_string(),
                    sock_name: None,
                    enabled: true,
                })
                .collect(),
        });
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
