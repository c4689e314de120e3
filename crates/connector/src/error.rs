use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("no data received for {0:?}")]
    ReadTimeout(Duration),
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
    #[error("connection invalidated after a failed write")]
    Invalidated,
    #[error("resubscribe failed: {0}")]
    ResubscribeFailed(String),
    #[error("reconnection abandoned after {0} attempts")]
    ReconnectAbandoned(u32),
    #[error("connection manager is closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("close failed: {0}")]
    CloseFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http sink received status code: {0}")]
    Status(u16),
    #[error("invalid sink config: {0}")]
    InvalidConfig(String),
    #[error("multi sink errors: {}", .0.join("; "))]
    Aggregate(Vec<String>),
    #[error("multi sink close errors: {}", .0.join("; "))]
    CloseAggregate(Vec<String>),
}
