//! wsrelay-connector: resilient stream feed runtime components
//!
//! This crate provides the feed session (dial, keepalive, reconnect and
//! subscription replay), the delivery pipeline and the sinks it writes to.

pub mod backoff;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod pipeline;
pub mod protocol;
pub mod server;
pub mod sinks;
pub mod subscription;
pub mod traits;
pub mod websocket;

#[cfg(test)]
mod testing;

pub use backoff::Backoff;
pub use error::{ConnectorError, SinkError};
pub use manager::{ConnectionConfig, ConnectionManager, Messages};
pub use metrics::RelayMetrics;
pub use pipeline::{Pipeline, PipelineExit, PipelineSummary};
pub use protocol::{StreamMethod, StreamRequest};
pub use server::{create_router, run_server, ServerState};
pub use sinks::{build_fanout, build_sink, ConsoleSink, FanoutSink, FileSink, HttpSink};
pub use subscription::SubscriptionRegistry;
pub use traits::{Dialer, FeedReader, FeedWriter, Frame, Sink};
pub use websocket::{WebSocketDialer, WebSocketReader, WebSocketWriter};
