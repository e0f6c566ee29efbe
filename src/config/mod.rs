//! Configuration management for Crossbar.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::{SerialConfig, TcpConfig, TransportKind};
use crate::types::MatrixLimits;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Router link configuration.
    #[serde(default)]
    pub router: RouterConfig,

    /// Matrix dimensions used for validation and dump iteration.
    #[serde(default)]
    pub matrix: MatrixLimits,

    /// Client fan-out configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;

        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.matrix.max_levels == 0 || self.matrix.max_levels > 16 {
            return Err(Error::InvalidConfig(
                "max_levels must be between 1 and 16".into(),
            ));
        }
        if self.matrix.max_sources == 0 || self.matrix.max_sources > 1024 {
            return Err(Error::InvalidConfig(
                "max_sources must be between 1 and 1024".into(),
            ));
        }
        if self.matrix.max_destinations == 0 || self.matrix.max_destinations > 1024 {
            return Err(Error::InvalidConfig(
                "max_destinations must be between 1 and 1024".into(),
            ));
        }
        if self.router.transport == TransportKind::Serial && self.router.serial.path.is_empty() {
            return Err(Error::InvalidConfig(
                "serial transport selected but no device path configured".into(),
            ));
        }
        Ok(())
    }

    /// Get default config path.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("io", "crossbar", "crossbar").map_or_else(
            || PathBuf::from("crossbar.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }

    /// Create example configuration.
    pub fn example() -> Self {
        Self {
            router: RouterConfig {
                transport: TransportKind::Tcp,
                tcp: TcpConfig {
                    host: "router.studio.lan".into(),
                    port: 2000,
                    ..Default::default()
                },
                ..Default::default()
            },
            matrix: MatrixLimits {
                max_sources: 256,
                max_destinations: 256,
                max_levels: 3,
            },
            ..Default::default()
        }
    }
}

/// Router link configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Which transport carries the SW-P-08 byte stream.
    #[serde(default)]
    pub transport: TransportKind,

    /// TCP endpoint.
    #[serde(default)]
    pub tcp: TcpConfig,

    /// Serial endpoint.
    #[serde(default)]
    pub serial: SerialConfig,

    /// Attempt the link at startup and keep it alive.
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,

    /// Delay before reconnecting after a drop.
    #[serde(default = "default_reconnect_delay", with = "humantime_serde")]
    pub reconnect_delay: Duration,
}

fn default_auto_connect() -> bool {
    true
}
fn default_reconnect_delay() -> Duration {
    Duration::from_secs(5)
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            tcp: TcpConfig::default(),
            serial: SerialConfig::default(),
            auto_connect: default_auto_connect(),
            reconnect_delay: default_reconnect_delay(),
        }
    }
}

/// Client fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// WebSocket listen address.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// CORS origin allowed to reach the fan-out.
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,

    /// Interval between status-update broadcasts.
    #[serde(default = "default_status_interval", with = "humantime_serde")]
    pub status_interval: Duration,
}

fn default_listen() -> SocketAddr {
    "0.0.0.0:3001".parse().expect("valid listen address")
}
fn default_allowed_origin() -> String {
    "http://localhost:3000".into()
}
fn default_status_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            allowed_origin: default_allowed_origin(),
            status_interval: default_status_interval(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Enable colored output.
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_color(),
        }
    }
}

/// Initialize logging.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(fmt::layer().with_ansi(config.color))
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    }

    Ok(())
}
