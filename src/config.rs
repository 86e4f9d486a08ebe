//! Configuration module for the http-relay proxy.
//!
//! Supports command-line arguments, environment variables and a TOML
//! configuration file. CLI arguments and environment variables take
//! precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::http::wire::{DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_HEADER_BYTES};
use crate::http::Limits;

/// Command-line arguments for the proxy
#[derive(Parser, Debug)]
#[command(name = "http-relay")]
#[command(author = "http-relay authors")]
#[command(version = "0.1.0")]
#[command(about = "A forward HTTP/1.1 proxy to a single backend", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind to (e.g., 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Backend address requests are forwarded to (host:port)
    #[arg(short, long, env = "BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Maximum number of concurrent client connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Answer failed requests with 4xx/5xx responses instead of closing
    #[arg(long)]
    pub error_responses: bool,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error) [default: info]
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Send synthesized error responses on failures
    #[serde(default)]
    pub error_responses: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            workers: None,
            error_responses: false,
        }
    }
}

/// Backend-related configuration
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    /// Backend address (host:port)
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// Timeout for establishing the backend connection in seconds (0 = disabled)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Idle timeout for socket reads and writes in seconds (0 = disabled)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            connect_timeout: default_connect_timeout(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

/// Message size limits
#[derive(Debug, Deserialize)]
pub struct LimitsConfig {
    /// Maximum size of a header block in bytes
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,
    /// Maximum size of a request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: default_max_header_bytes(),
            max_body_bytes: default_max_body_bytes(),
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

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_connections() -> usize {
    10000
}

fn default_backend_url() -> String {
    "localhost:8081".to_string()
}

fn default_connect_timeout() -> u64 {
    10 // 10 seconds
}

fn default_idle_timeout() -> u64 {
    60 // 60 seconds
}

fn default_max_header_bytes() -> usize {
    DEFAULT_MAX_HEADER_BYTES
}

fn default_max_body_bytes() -> u64 {
    DEFAULT_MAX_BODY_BYTES
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub backend_url: String,
    pub max_connections: usize,
    pub connect_timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub limits: Limits,
    pub error_responses: bool,
    pub workers: Option<usize>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(CliArgs::default_args(), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from CLI args, environment and optional TOML file.
    /// CLI arguments and environment take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let config = Self::merge(cli, toml_config);
        config.validate()?;
        Ok(config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let seconds = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));

        Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            backend_url: cli.backend_url.unwrap_or(toml_config.backend.url),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            connect_timeout: seconds(toml_config.backend.connect_timeout),
            idle_timeout: seconds(toml_config.backend.idle_timeout),
            limits: Limits {
                max_header_bytes: toml_config.limits.max_header_bytes,
                max_body_bytes: toml_config.limits.max_body_bytes,
            },
            error_responses: cli.error_responses || toml_config.server.error_responses,
            workers: cli.workers.or(toml_config.server.workers),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_url.trim().is_empty() {
            return Err(ConfigError::Invalid("backend url is empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.limits.max_header_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_header_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Address the listener binds to
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl CliArgs {
    fn default_args() -> Self {
        CliArgs {
            config: None,
            port: None,
            host: None,
            backend_url: None,
            max_connections: None,
            error_responses: false,
            workers: None,
            log_level: None,
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
