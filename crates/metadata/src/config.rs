use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use url::Url;

use crate::error::MetadataError;

/// Default feed label used in logs and metrics
pub const DEFAULT_NAME: &str = "binance";
/// Default public stream endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://stream.binance.com:9443/ws";
/// Default health server bind address
pub const DEFAULT_HEALTH_ADDR: &str = "0.0.0.0:8081";
/// Default HTTP sink method
pub const DEFAULT_HTTP_METHOD: &str = "POST";
/// Default HTTP sink content type
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";
/// Idle window before a silent connection is considered dead (5 minutes)
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;
/// Deadline for individual writes (pongs, subscribe requests)
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;
/// First reconnect delay
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 1;
/// Reconnect delay ceiling
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 30;
/// Inbound message queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_health_addr() -> String {
    DEFAULT_HEALTH_ADDR.to_string()
}

fn default_http_method() -> String {
    DEFAULT_HTTP_METHOD.to_string()
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

fn default_read_timeout_secs() -> u64 {
    DEFAULT_READ_TIMEOUT_SECS
}

fn default_write_timeout_secs() -> u64 {
    DEFAULT_WRITE_TIMEOUT_SECS
}

fn default_backoff_min_secs() -> u64 {
    DEFAULT_BACKOFF_MIN_SECS
}

fn default_backoff_max_secs() -> u64 {
    DEFAULT_BACKOFF_MAX_SECS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileSinkConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpSinkConfig {
    pub url: String,
    #[serde(default = "default_http_method")]
    pub method: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

/// One output destination. The `type` key selects the adapter and the
/// adapter's own section must be present alongside it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    Console,
    File { file: FileSinkConfig },
    Http { http: HttpSinkConfig },
}

impl SinkConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SinkConfig::Console => "console",
            SinkConfig::File { .. } => "file",
            SinkConfig::Http { .. } => "http",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthConfig {
    #[serde(default = "default_health_addr")]
    pub addr: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            addr: default_health_addr(),
        }
    }
}

impl HealthConfig {
    /// Parse the bind address. A bare `:port` binds on all interfaces.
    pub fn socket_addr(&self) -> Result<SocketAddr, MetadataError> {
        parse_bind_addr(&self.addr)
    }
}

/// Parse a bind address, accepting the `:port` shorthand.
pub fn parse_bind_addr(addr: &str) -> Result<SocketAddr, MetadataError> {
    let candidate = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };
    candidate
        .parse()
        .map_err(|e| MetadataError::invalid("health.addr", format!("{}: {}", addr, e)))
}

/// Connection resilience tunables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSettings {
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_backoff_min_secs")]
    pub backoff_min_secs: u64,
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Consecutive failed reconnect attempts before giving up.
    /// Unset means retry forever; `0` disables reconnection.
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            backoff_min_secs: default_backoff_min_secs(),
            backoff_max_secs: default_backoff_max_secs(),
            queue_capacity: default_queue_capacity(),
            max_reconnect_attempts: None,
        }
    }
}

impl ConnectionSettings {
    fn validate(&self) -> Result<(), MetadataError> {
        if self.read_timeout_secs == 0 {
            return Err(MetadataError::invalid(
                "connection.read_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.write_timeout_secs == 0 {
            return Err(MetadataError::invalid(
                "connection.write_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.backoff_min_secs == 0 {
            return Err(MetadataError::invalid(
                "connection.backoff_min_secs",
                "must be greater than zero",
            ));
        }
        if self.backoff_max_secs < self.backoff_min_secs {
            return Err(MetadataError::invalid(
                "connection.backoff_max_secs",
                format!(
                    "{} is below backoff_min_secs ({})",
                    self.backoff_max_secs, self.backoff_min_secs
                ),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(MetadataError::invalid(
                "connection.queue_capacity",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Top-level relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub streams: Vec<String>,
    pub sinks: Vec<SinkConfig>,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub connection: ConnectionSettings,
}

impl RelayConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, MetadataError> {
        let config: RelayConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        let endpoint = Url::parse(&self.endpoint)
            .map_err(|e| MetadataError::invalid("endpoint", e.to_string()))?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(MetadataError::invalid(
                "endpoint",
                format!("unsupported scheme '{}'", endpoint.scheme()),
            ));
        }

        if let Some(pos) = self.streams.iter().position(|s| s.trim().is_empty()) {
            return Err(MetadataError::invalid(
                format!("streams[{}]", pos),
                "stream name is empty",
            ));
        }

        if self.sinks.is_empty() {
            return Err(MetadataError::invalid("sinks", "at least one sink is required"));
        }

        for (i, sink) in self.sinks.iter().enumerate() {
            match sink {
                SinkConfig::Console => {}
                SinkConfig::File { file } => {
                    if file.path.trim().is_empty() {
                        return Err(MetadataError::invalid(
                            format!("sinks[{}].file.path", i),
                            "path is empty",
                        ));
                    }
                }
                SinkConfig::Http { http } => {
                    let url = Url::parse(&http.url).map_err(|e| {
                        MetadataError::invalid(format!("sinks[{}].http.url", i), e.to_string())
                    })?;
                    if !matches!(url.scheme(), "http" | "https") {
                        return Err(MetadataError::invalid(
                            format!("sinks[{}].http.url", i),
                            format!("unsupported scheme '{}'", url.scheme()),
                        ));
                    }
                    if http.method.is_empty()
                        || !http.method.chars().all(|c| c.is_ascii_alphabetic())
                    {
                        return Err(MetadataError::invalid(
                            format!("sinks[{}].http.method", i),
                            format!("'{}' is not an HTTP method", http.method),
                        ));
                    }
                }
            }
        }

        self.health.socket_addr()?;
        self.connection.validate()
    }
}
