//! wsrelay-metadata: Relay configuration types loaded from YAML

pub mod config;
pub mod error;

pub use config::{
    parse_bind_addr, ConnectionSettings, FileSinkConfig, HealthConfig, HttpSinkConfig,
    RelayConfig, SinkConfig,
};
pub use error::MetadataError;
