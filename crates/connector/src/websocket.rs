//! WebSocket transport for the feed
//!
//! Dials the stream endpoint and splits the socket so the session loop can own
//! the read half while control writes (subscribe requests, pongs) go through
//! the write half.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, trace};
use url::Url;

use crate::error::ConnectorError;
use crate::traits::{Dialer, FeedReader, FeedWriter, Frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials a `ws://` or `wss://` endpoint
#[derive(Debug, Clone)]
pub struct WebSocketDialer {
    url: String,
}

impl WebSocketDialer {
    pub fn new(url: impl Into<String>) -> Result<Self, ConnectorError> {
        let url = url.into();
        let parsed =
            Url::parse(&url).map_err(|e| ConnectorError::ConnectionFailed(e.to_string()))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ConnectorError::ConnectionFailed(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }
        Ok(Self { url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Dialer for WebSocketDialer {
    type Reader = WebSocketReader;
    type Writer = WebSocketWriter;

    async fn dial(&self) -> Result<(WebSocketReader, WebSocketWriter), ConnectorError> {
        info!(url = %self.url, "Connecting to feed WebSocket");

        let (ws, response) = connect_async(self.url.as_str()).await?;

        info!(status = ?response.status(), "Feed WebSocket connected");

        let (sink, stream) = ws.split();
        Ok((WebSocketReader { stream }, WebSocketWriter { sink }))
    }
}

pub struct WebSocketReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FeedReader for WebSocketReader {
    async fn next_frame(&mut self) -> Result<Frame, ConnectorError> {
        match self.stream.next().await {
            Some(Ok(WsMessage::Text(text))) => Ok(Frame::Data(Bytes::from(text.into_bytes()))),
            Some(Ok(WsMessage::Binary(data))) => Ok(Frame::Data(Bytes::from(data))),
            Some(Ok(WsMessage::Ping(payload))) => Ok(Frame::Ping(Bytes::from(payload))),
            Some(Ok(WsMessage::Close(frame))) => {
                info!(frame = ?frame, "Feed WebSocket closed by peer");
                Err(ConnectorError::ConnectionClosed)
            }
            Some(Ok(_)) => Ok(Frame::Control),
            Some(Err(e)) => Err(e.into()),
            None => Err(ConnectorError::ConnectionClosed),
        }
    }
}

pub struct WebSocketWriter {
    sink: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl FeedWriter for WebSocketWriter {
    async fn send_text(&mut self, text: String) -> Result<(), ConnectorError> {
        debug!(cmd = %text, "Sending stream request");
        self.sink.send(WsMessage::Text(text)).await?;
        Ok(())
    }

    /// tungstenite queues the echo itself when it reads a ping; flushing
    /// puts it on the wire without sending a second pong.
    async fn send_pong(&mut self, payload: Bytes) -> Result<(), ConnectorError> {
        trace!(len = payload.len(), "Flushing queued pong");
        self.sink.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        self.sink.close().await?;
        Ok(())
    }
}
