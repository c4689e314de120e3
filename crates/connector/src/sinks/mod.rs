//! Output destinations
//!
//! Concrete adapters (console, file, HTTP) plus the fan-out dispatcher that
//! combines them behind the single [`Sink`] contract.

mod console;
mod fanout;
mod file;
mod http;

pub use console::ConsoleSink;
pub use fanout::FanoutSink;
pub use file::FileSink;
pub use http::{HttpSink, HTTP_SINK_TIMEOUT};

use tracing::info;
use wsrelay_metadata::SinkConfig;

use crate::error::SinkError;
use crate::traits::Sink;

/// Build one sink from its configuration
pub fn build_sink(config: &SinkConfig) -> Result<Box<dyn Sink>, SinkError> {
    match config {
        SinkConfig::Console => Ok(Box::new(ConsoleSink::new())),
        SinkConfig::File { file } => {
            let sink = FileSink::open(&file.path)?;
            info!(path = %file.path, "File sink opened");
            Ok(Box::new(sink))
        }
        SinkConfig::Http { http } => {
            let sink = HttpSink::new(&http.url, &http.method, &http.content_type)?;
            info!(url = %http.url, method = %http.method, "HTTP sink configured");
            Ok(Box::new(sink))
        }
    }
}

/// Build the fan-out over every configured sink, in configuration order.
/// Any construction failure aborts the whole set.
pub fn build_fanout(configs: &[SinkConfig]) -> Result<FanoutSink, SinkError> {
    let sinks = configs
        .iter()
        .map(build_sink)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FanoutSink::new(sinks))
}
