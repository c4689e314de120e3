use async_trait::async_trait;
use std::io::Write;

use crate::error::SinkError;
use crate::traits::Sink;

/// Writes each message to stdout, one per line
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        out.write_all(data)?;
        out.write_all(b"\n")?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        std::io::stdout().flush()?;
        Ok(())
    }
}
