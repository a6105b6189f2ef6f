//! Configuration management.
//!
//! The configuration is a read-only snapshot taken once at startup and shared
//! with every component for the lifetime of the process.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;
use totalmix_bridge_types::{DEFAULT_DEVICE_LISTEN_PORT, DEFAULT_DEVICE_SEND_PORT, DEFAULT_PORT};

/// Default device host (TotalMix normally runs on the same machine).
pub const DEFAULT_DEVICE_HOST: &str = "127.0.0.1";
/// Default deadline for one EQ read, in milliseconds.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 500;
/// Default bound on waiting for channel names, in milliseconds.
pub const DEFAULT_NAME_WAIT_MS: u64 = 300;

/// Slack added on top of the engine read deadline for the HTTP-level timeout.
const FACADE_TIMEOUT_SLACK: Duration = Duration::from_secs(1);

/// Configuration structure that matches the TOML file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    device: DeviceConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeviceConfig {
    #[serde(default = "default_device_host")]
    host: String,
    /// Port TotalMix receives OSC on ("Port incoming" in TotalMix)
    #[serde(default = "default_send_port")]
    send_port: u16,
    /// Port the bridge receives OSC on ("Port outgoing" in TotalMix)
    #[serde(default = "default_listen_port")]
    listen_port: u16,
    #[serde(default = "default_read_timeout_ms")]
    read_timeout_ms: u64,
    #[serde(default = "default_name_wait_ms")]
    name_wait_ms: u64,
    /// Query channel names right after startup instead of on first request
    #[serde(default)]
    eager_channel_query: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: default_device_host(),
            send_port: default_send_port(),
            listen_port: default_listen_port(),
            read_timeout_ms: default_read_timeout_ms(),
            name_wait_ms: default_name_wait_ms(),
            eager_channel_query: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LoggingConfig {
    /// Trace every OSC message in and out
    #[serde(default)]
    debug: bool,
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    log_file: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    /// If not set, uses RUST_LOG environment variable or defaults to "info"
    log_level: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_device_host() -> String {
    DEFAULT_DEVICE_HOST.to_string()
}

fn default_send_port() -> u16 {
    DEFAULT_DEVICE_SEND_PORT
}

fn default_listen_port() -> u16 {
    DEFAULT_DEVICE_LISTEN_PORT
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

fn default_name_wait_ms() -> u64 {
    DEFAULT_NAME_WAIT_MS
}

/// Values supplied on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub http_port: Option<u16>,
    pub device_host: Option<String>,
    pub osc_send: Option<u16>,
    pub osc_listen: Option<u16>,
    pub debug: bool,
    pub log_file: Option<PathBuf>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP port to listen on
    pub port: u16,
    /// Host running TotalMix
    pub device_host: String,
    /// UDP port OSC commands are sent to
    pub device_send_port: u16,
    /// UDP port OSC replies are received on
    pub device_listen_port: u16,
    /// Deadline for one EQ read
    pub read_timeout: Duration,
    /// Upper bound on waiting for channel names after a name query
    pub name_wait: Duration,
    /// Query channel names at startup
    pub eager_channel_query: bool,
    /// Trace OSC traffic
    pub debug: bool,
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    pub log_file: Option<PathBuf>,
    /// Log level (if set, overrides RUST_LOG environment variable)
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with full priority chain: CLI args > env vars > config files > defaults.
    ///
    /// Config files are searched in this order:
    /// 1. `config.toml` in user config directory (~/.config/totalmix-bridge/ on Linux)
    /// 2. `.totalmix-bridge.toml` in current directory
    pub fn from_figment(overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let local_config = std::env::current_dir()
            .ok()
            .map(|d| d.join(".totalmix-bridge.toml"));
        let user_config = directories::ProjectDirs::from("", "", "totalmix-bridge")
            .map(|dirs| dirs.config_dir().join("config.toml"));

        // Priority: defaults < user config < local config < env vars < CLI args
        let mut figment = Figment::new().merge(Serialized::defaults(ConfigFile {
            server: ServerConfig::default(),
            device: DeviceConfig::default(),
            logging: LoggingConfig::default(),
        }));

        if let Some(ref path) = user_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        if let Some(ref path) = local_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // TOTALMIX_BRIDGE_DEVICE__SEND_PORT -> device.send_port
        figment = figment.merge(Env::prefixed("TOTALMIX_BRIDGE_").split("__"));

        if let Some(p) = overrides.http_port {
            figment = figment.merge(Serialized::default("server.port", p));
        }
        if let Some(ref host) = overrides.device_host {
            figment = figment.merge(Serialized::default("device.host", host));
        }
        if let Some(p) = overrides.osc_send {
            figment = figment.merge(Serialized::default("device.send_port", p));
        }
        if let Some(p) = overrides.osc_listen {
            figment = figment.merge(Serialized::default("device.listen_port", p));
        }
        if overrides.debug {
            figment = figment.merge(Serialized::default("logging.debug", true));
        }
        if let Some(ref path) = overrides.log_file {
            figment = figment.merge(Serialized::default("logging.log_file", path));
        }

        let config_file: ConfigFile = figment.extract()?;
        Ok(Self::from(config_file))
    }

    /// Resolve the device endpoint to a socket address.
    pub fn device_addr(&self) -> anyhow::Result<SocketAddr> {
        (self.device_host.as_str(), self.device_send_port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| anyhow::anyhow!("Cannot resolve device host '{}'", self.device_host))
    }

    /// Timeout applied by HTTP handlers around an EQ read.
    ///
    /// Always longer than `read_timeout` so the engine reports partial
    /// results before the handler gives up.
    pub fn facade_timeout(&self) -> Duration {
        self.read_timeout + FACADE_TIMEOUT_SLACK
    }
}

impl From<ConfigFile> for Config {
    fn from(file: ConfigFile) -> Self {
        Self {
            port: file.server.port,
            device_host: file.device.host,
            device_send_port: file.device.send_port,
            device_listen_port: file.device.listen_port,
            read_timeout: Duration::from_millis(file.device.read_timeout_ms),
            name_wait: Duration::from_millis(file.device.name_wait_ms),
            eager_channel_query: file.device.eager_channel_query,
            debug: file.logging.debug,
            log_file: file.logging.log_file,
            log_level: file.logging.log_level,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from(ConfigFile {
            server: ServerConfig::default(),
            device: DeviceConfig::default(),
            logging: LoggingConfig::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn clear_env() {
        std::env::remove_var("TOTALMIX_BRIDGE_SERVER__PORT");
        std::env::remove_var("TOTALMIX_BRIDGE_DEVICE__SEND_PORT");
        std::env::remove_var("TOTALMIX_BRIDGE_DEVICE__LISTEN_PORT");
    }

    /// Run `f` with the current directory set to `dir`.
    fn in_dir<T>(dir: &TempDir, f: impl FnOnce() -> T) -> T {
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        let result = f();
        let _ = std::env::set_current_dir(original_dir);
        result
    }

    #[test]
    #[serial]
    fn test_from_figment_defaults() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();

        let config = in_dir(&temp_dir, || {
            Config::from_figment(&ConfigOverrides::default()).unwrap()
        });

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.device_send_port, DEFAULT_DEVICE_SEND_PORT);
        assert_eq!(config.device_listen_port, DEFAULT_DEVICE_LISTEN_PORT);
        assert_eq!(config.read_timeout, Duration::from_millis(500));
        assert!(!config.debug);
    }

    #[test]
    #[serial]
    fn test_from_figment_config_file() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let config_content = r#"
[server]
port = 7777

[device]
send_port = 7001
listen_port = 9001
read_timeout_ms = 800

[logging]
debug = true
"#;
        fs::write(temp_dir.path().join(".totalmix-bridge.toml"), config_content).unwrap();

        let config = in_dir(&temp_dir, || {
            Config::from_figment(&ConfigOverrides::default()).unwrap()
        });

        assert_eq!(config.port, 7777);
        assert_eq!(config.device_send_port, 7001);
        assert_eq!(config.device_listen_port, 9001);
        assert_eq!(config.read_timeout, Duration::from_millis(800));
        assert!(config.debug);
    }

    #[test]
    #[serial]
    fn test_from_figment_env_vars_override_config_file() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(".totalmix-bridge.toml"),
            "[device]\nsend_port = 7001",
        )
        .unwrap();
        std::env::set_var("TOTALMIX_BRIDGE_DEVICE__SEND_PORT", "7002");

        let config = in_dir(&temp_dir, || {
            Config::from_figment(&ConfigOverrides::default()).unwrap()
        });
        clear_env();

        assert_eq!(config.device_send_port, 7002);
    }

    #[test]
    #[serial]
    fn test_from_figment_cli_overrides_env_and_config() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(".totalmix-bridge.toml"),
            "[server]\nport = 7777",
        )
        .unwrap();
        std::env::set_var("TOTALMIX_BRIDGE_SERVER__PORT", "8888");

        let overrides = ConfigOverrides {
            http_port: Some(9999),
            osc_listen: Some(9100),
            debug: true,
            ..Default::default()
        };
        let config = in_dir(&temp_dir, || Config::from_figment(&overrides).unwrap());
        clear_env();

        assert_eq!(config.port, 9999);
        assert_eq!(config.device_listen_port, 9100);
        assert!(config.debug);
    }

    #[test]
    fn test_facade_timeout_exceeds_read_timeout() {
        let config = Config {
            read_timeout: Duration::from_millis(250),
            ..Config::default()
        };
        assert!(config.facade_timeout() > config.read_timeout);
    }

    #[test]
    fn test_device_addr_resolves_loopback() {
        let config = Config::default();
        let addr = config.device_addr().unwrap();
        assert_eq!(addr.port(), DEFAULT_DEVICE_SEND_PORT);
        assert!(addr.ip().is_loopback());
    }
}
