use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{ConnectorError, SinkError};

/// Inbound frame surfaced by a transport read half
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Application payload (text or binary), passed through untouched
    Data(Bytes),
    /// Transport keepalive probe; the payload must be echoed back
    Ping(Bytes),
    /// Any other control frame (pong, raw frame). Counts as activity only.
    Control,
}

/// Read half of a live transport session
#[async_trait]
pub trait FeedReader: Send {
    /// Wait for the next frame. A clean close by the peer is an error:
    /// the session is over either way.
    async fn next_frame(&mut self) -> Result<Frame, ConnectorError>;
}

/// Write half of a live transport session
#[async_trait]
pub trait FeedWriter: Send {
    /// Send a text message (subscribe/unsubscribe requests)
    async fn send_text(&mut self, text: String) -> Result<(), ConnectorError>;

    /// Acknowledge a keepalive probe with its own payload
    async fn send_pong(&mut self, payload: Bytes) -> Result<(), ConnectorError>;

    /// Close the session
    async fn close(&mut self) -> Result<(), ConnectorError>;
}

/// Opens transport sessions. Each successful dial yields an independent
/// read half and write half of the same session.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Reader: FeedReader + 'static;
    type Writer: FeedWriter + 'static;

    async fn dial(&self) -> Result<(Self::Reader, Self::Writer), ConnectorError>;
}

/// Sink trait for output destinations (console, file, HTTP, fan-out)
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short label used in logs, metrics and aggregate errors
    fn name(&self) -> &str;

    /// Deliver one message to the destination
    async fn write(&mut self, data: &[u8]) -> Result<(), SinkError>;

    /// Flush and release the destination
    async fn close(&mut self) -> Result<(), SinkError>;
}
