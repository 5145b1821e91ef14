//! Configuration module for the tarpit.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::drip::DEFAULT_INTERVAL;

/// Protocol the tarpit pretends to speak on its listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    /// Endless SSH-looking banner line.
    #[default]
    Ssh,
    /// A status line followed by an endless stream of random headers.
    Http,
}

impl ProtocolType {
    /// Short name, also used as the metrics subsystem.
    pub fn name(self) -> &'static str {
        match self {
            ProtocolType::Ssh => "ssh",
            ProtocolType::Http => "http",
        }
    }

    /// Listen address used when neither the CLI nor the file sets one.
    pub fn default_listen(self) -> &'static str {
        match self {
            ProtocolType::Ssh => "0.0.0.0:22",
            ProtocolType::Http => "0.0.0.0:80",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Command-line arguments for the tarpit
#[derive(Parser, Debug)]
#[command(name = "tarpit")]
#[command(author = "tarpit authors")]
#[command(version = "0.1.0")]
#[command(about = "Holds scanner connections open with a slow drip of bytes", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Protocol to imitate on the listener
    #[arg(short, long, value_enum)]
    pub protocol: Option<ProtocolType>,

    /// Address to trap connections on (e.g., 0.0.0.0:22 or :22)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Address for the Prometheus metrics endpoint
    #[arg(short = 'm', long)]
    pub metrics_listen: Option<String>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to; defaults depend on the protocol
    pub listen: Option<String>,
    /// Protocol to imitate
    #[serde(default)]
    pub protocol: ProtocolType,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Pause between two writes on a connection, in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: None,
            protocol: ProtocolType::default(),
            workers: None,
            interval_ms: default_interval_ms(),
        }
    }
}

/// Metrics endpoint configuration
#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    /// Address of the `/metrics` HTTP endpoint
    #[serde(default = "default_metrics_listen")]
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen: default_metrics_listen(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
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

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL.as_millis() as u64
}

fn default_metrics_listen() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub protocol: ProtocolType,
    pub metrics_listen: String,
    pub interval: Duration,
    pub workers: Option<usize>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents =
                std::fs::read_to_string(config_path).map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
                path: config_path.clone(),
                source,
            })?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over a parsed TOML file.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        if toml_config.server.interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if cli.workers.or(toml_config.server.workers) == Some(0) {
            return Err(ConfigError::ZeroWorkers);
        }

        let protocol = cli.protocol.unwrap_or(toml_config.server.protocol);
        let listen = cli
            .listen
            .or(toml_config.server.listen)
            .unwrap_or_else(|| protocol.default_listen().to_string());
        let metrics_listen = cli.metrics_listen.unwrap_or(toml_config.metrics.listen);

        Ok(Config {
            listen: normalize_listen(&listen)?,
            protocol,
            metrics_listen: normalize_listen(&metrics_listen)?,
            interval: Duration::from_millis(toml_config.server.interval_ms),
            workers: cli.workers.or(toml_config.server.workers),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

/// Expand the `:port` shorthand to every IPv4 interface and check that the
/// address has a port.
pub fn normalize_listen(addr: &str) -> Result<String, ConfigError> {
    let addr = addr.trim();
    let expanded = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };

    match expanded.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(expanded),
        _ => Err(ConfigError::InvalidAddress(addr.to_string())),
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid listen address '{0}', expected host:port or :port")]
    InvalidAddress(String),
    #[error("server.interval_ms must be greater than zero")]
    ZeroInterval,
    #[error("workers must be greater than zero")]
    ZeroWorkers,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        CliArgs::parse_from(std::iter::once("tarpit").chain(args.iter().copied()))
    }

    #[test]
    fn test_default_config() {
        let config = Config::merge(cli(&[]), TomlConfig::default()).unwrap();
        assert_eq!(config.protocol, ProtocolType::Ssh);
        assert_eq!(config.listen, "0.0.0.0:22");
        assert_eq!(config.metrics_listen, "127.0.0.1:5000");
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.workers, None);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_http_default_listen() {
        let config = Config::merge(cli(&["--protocol", "http"]), TomlConfig::default()).unwrap();
        assert_eq!(config.protocol, ProtocolType::Http);
        assert_eq!(config.listen, "0.0.0.0:80");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "0.0.0.0:2222"
            protocol = "http"
            workers = 4
            interval_ms = 250

            [metrics]
            listen = "127.0.0.1:9100"

            [logging]
            level = "debug"
        "#;

        let toml_config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(toml_config.server.listen.as_deref(), Some("0.0.0.0:2222"));
        assert_eq!(toml_config.server.protocol, ProtocolType::Http);

        let config = Config::merge(cli(&[]), toml_config).unwrap();
        assert_eq!(config.listen, "0.0.0.0:2222");
        assert_eq!(config.metrics_listen, "127.0.0.1:9100");
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.workers, Some(4));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            listen = "0.0.0.0:2222"
            protocol = "http"

            [logging]
            level = "debug"
        "#,
        )
        .unwrap();

        let config = Config::merge(
            cli(&["-p", "ssh", "-l", ":2022", "-m", ":9000", "--log-level", "warn"]),
            toml_config,
        )
        .unwrap();
        assert_eq!(config.protocol, ProtocolType::Ssh);
        assert_eq!(config.listen, "0.0.0.0:2022");
        assert_eq!(config.metrics_listen, "0.0.0.0:9000");
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_normalize_listen() {
        assert_eq!(normalize_listen(":22").unwrap(), "0.0.0.0:22");
        assert_eq!(normalize_listen("127.0.0.1:80").unwrap(), "127.0.0.1:80");
        assert_eq!(normalize_listen("localhost:8080").unwrap(), "localhost:8080");
        assert!(normalize_listen("127.0.0.1").is_err());
        assert!(normalize_listen(":http").is_err());
        assert!(normalize_listen(":99999").is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let toml_config: TomlConfig = toml::from_str("[server]\ninterval_ms = 0\n").unwrap();
        assert!(matches!(
            Config::merge(cli(&[]), toml_config),
            Err(ConfigError::ZeroInterval)
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            Config::merge(cli(&["--workers", "0"]), TomlConfig::default()),
            Err(ConfigError::ZeroWorkers)
        ));

        let toml_config: TomlConfig = toml::from_str("[server]\nworkers = 0\n").unwrap();
        assert!(matches!(
            Config::merge(cli(&[]), toml_config),
            Err(ConfigError::ZeroWorkers)
        ));
    }
}
