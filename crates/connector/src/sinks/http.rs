use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use std::time::Duration;
use tracing::trace;

use crate::error::SinkError;
use crate::traits::Sink;

/// Per-request timeout for forwarded messages
pub const HTTP_SINK_TIMEOUT: Duration = Duration::from_secs(10);

/// Forwards each message as the body of an HTTP request.
/// Any status >= 400 or transport failure is a write error.
pub struct HttpSink {
    url: String,
    method: Method,
    content_type: String,
    client: Client,
}

impl HttpSink {
    pub fn new(
        url: impl Into<String>,
        method: &str,
        content_type: impl Into<String>,
    ) -> Result<Self, SinkError> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|e| SinkError::InvalidConfig(format!("method '{}': {}", method, e)))?;
        let client = Client::builder().timeout(HTTP_SINK_TIMEOUT).build()?;
        Ok(Self {
            url: url.into(),
            method,
            content_type: content_type.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Sink for HttpSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        let response = self
            .client
            .request(self.method.clone(), &self.url)
            .header(CONTENT_TYPE, &self.content_type)
            .body(data.to_vec())
            .send()
            .await?;

        let status = response.status();
        trace!(url = %self.url, status = status.as_u16(), "Forwarded message");
        if status.as_u16() >= 400 {
            return Err(SinkError::Status(status.as_u16()));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
