//! Configuration management for the gateway
//!
//! Loads configuration from environment variables (and a `.env` file when
//! present). Command-line flags in the binary override these values.

use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::net::IpAddr;
use std::time::Duration;
use url::Url;

/// Default Plane API host
pub const DEFAULT_API_HOST_URL: &str = "https://api.plane.so/";

/// Default listen port
pub const DEFAULT_PORT: u16 = 3000;

/// Largest accepted `POST /messages` body
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(Error::Config(format!(
                "Invalid log format: {}. Valid options: pretty, json",
                s
            ))),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Upstream Plane API settings, consumed by tools
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Plane API token
    pub api_key: SecretString,
    /// Workspace slug the tools operate on
    pub workspace_slug: String,
    /// API host, normalized
    pub host_url: String,
}

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub host: IpAddr,
    /// Listen port
    pub port: u16,
    /// Interval between SSE keep-alive comments
    pub keep_alive: Duration,
    /// Upper bound on closing a single session during shutdown
    pub drain_timeout: Duration,
    /// Request body limit for the message endpoint
    pub max_message_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            keep_alive: Duration::from_secs(15),
            drain_timeout: Duration::from_secs(5),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level filter
    pub level: String,
    /// Log format
    pub format: LogFormat,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Plane API settings
    pub upstream: UpstreamConfig,
    /// HTTP server settings
    pub server: ServerConfig,
    /// Logging settings
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let defaults = ServerConfig::default();

        Ok(Config {
            upstream: UpstreamConfig {
                api_key: SecretString::from(std::env::var("PLANE_API_KEY").unwrap_or_default()),
                workspace_slug: std::env::var("PLANE_WORKSPACE_SLUG").unwrap_or_default(),
                host_url: Url::parse(
                    &std::env::var("PLANE_API_HOST_URL")
                        .unwrap_or_else(|_| DEFAULT_API_HOST_URL.to_string()),
                )?
                .to_string(),
            },
            server: ServerConfig {
                host: match std::env::var("HOST") {
                    Ok(host) => host
                        .parse()
                        .map_err(|e| Error::Config(format!("Invalid HOST '{}': {}", host, e)))?,
                    Err(_) => defaults.host,
                },
                port: match std::env::var("PORT") {
                    Ok(port) => port
                        .parse()
                        .map_err(|e| Error::Config(format!("Invalid PORT '{}': {}", port, e)))?,
                    Err(_) => defaults.port,
                },
                keep_alive: std::env::var("SSE_KEEP_ALIVE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.keep_alive),
                drain_timeout: std::env::var("SHUTDOWN_DRAIN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.drain_timeout),
                max_message_bytes: defaults.max_message_bytes,
            },
            log: LogConfig {
                level: std::env::var("RUST_LOG")
                    .unwrap_or_else(|_| "info,plane_mcp_gateway=debug".to_string()),
                format: std::env::var("LOG_FORMAT")
                    .unwrap_or_else(|_| "pretty".to_string())
                    .parse()?,
            },
        })
    }

    /// Create a minimal config for tests
    pub fn minimal() -> Self {
        Config {
            upstream: UpstreamConfig {
                api_key: SecretString::from(""),
                workspace_slug: String::new(),
                host_url: DEFAULT_API_HOST_URL.to_string(),
            },
            server: ServerConfig::default(),
            log: LogConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }

    /// Validate that the upstream credentials are present
    pub fn validate(&self) -> Result<()> {
        if self.upstream.api_key.expose_secret().is_empty() {
            return Err(Error::Config("PLANE_API_KEY is required".to_string()));
        }
        if self.upstream.workspace_slug.is_empty() {
            return Err(Error::Config("PLANE_WORKSPACE_SLUG is required".to_string()));
        }
        Ok(())
    }
}
