use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{ConnectorError, SinkError};
use crate::manager::Messages;
use crate::metrics::RelayMetrics;
use crate::sinks::FanoutSink;
use crate::traits::Sink;

/// Why the delivery loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineExit {
    /// The inbound message sequence ended (close or session loop stopped)
    SourceEnded,
    /// The source reported a fatal error
    SourceError(String),
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    /// Messages handed to the fan-out
    pub messages: u64,
    /// Messages that failed in at least one sink
    pub failed_writes: u64,
    pub exit: PipelineExit,
}

/// Drains the inbound queue into the sink set
pub struct Pipeline {
    sink: FanoutSink,
    metrics: RelayMetrics,
}

impl Pipeline {
    pub fn new(feed: impl Into<String>, sink: FanoutSink) -> Self {
        Self {
            sink,
            metrics: RelayMetrics::new(feed),
        }
    }

    /// Deliver messages until the source ends or fails.
    ///
    /// Sink failures are logged and counted; they never stop delivery.
    pub async fn run(
        &mut self,
        messages: &mut Messages,
        errors: &mut mpsc::Receiver<ConnectorError>,
    ) -> PipelineSummary {
        let mut delivered: u64 = 0;
        let mut failed_writes: u64 = 0;

        info!(feed = %self.metrics.feed(), sinks = ?self.sink.names(), "Pipeline started");

        let exit = loop {
            select! {
                msg = messages.recv() => {
                    let Some(data) = msg else {
                        info!(feed = %self.metrics.feed(), "Message source ended");
                        break PipelineExit::SourceEnded;
                    };

                    let (failed, result) = self.sink.write_all(&data).await;
                    delivered += 1;
                    self.metrics.inc_delivered();
                    if let Err(e) = result {
                        failed_writes += 1;
                        for name in &failed {
                            self.metrics.inc_sink_error(name);
                        }
                        warn!(error = %e, len = data.len(), "Sink write failed");
                    }
                }
                Some(err) = errors.recv() => {
                    error!(feed = %self.metrics.feed(), error = %err, "Message source failed");
                    break PipelineExit::SourceError(err.to_string());
                }
            }
        };

        debug!(delivered, failed_writes, "Pipeline stopped");
        PipelineSummary {
            messages: delivered,
            failed_writes,
            exit,
        }
    }

    /// Close every sink in the set
    pub async fn close(&mut self) -> Result<(), SinkError> {
        self.sink.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::sync::watch;

    struct Source {
        tx: mpsc::Sender<Bytes>,
        err_tx: mpsc::Sender<ConnectorError>,
        shutdown: watch::Sender<bool>,
        messages: Messages,
        errors: mpsc::Receiver<ConnectorError>,
    }

    fn source() -> Source {
        let (tx, rx) = mpsc::channel(16);
        let (err_tx, errors) = mpsc::channel(1);
        let (shutdown, shutdown_rx) = watch::channel(false);
        Source {
            tx,
            err_tx,
            shutdown,
            messages: Messages::from_parts(rx, shutdown_rx),
            errors,
        }
    }

    #[tokio::test]
    async fn test_delivers_in_order_until_source_ends() {
        let (sink, recorded) = RecordingSink::new("rec");
        let mut pipeline = Pipeline::new("pipeline-test-order", FanoutSink::new(vec![Box::new(sink)]));
        let mut src = source();

        for msg in ["a", "b", "c"] {
            src.tx.send(Bytes::from(msg)).await.unwrap();
        }
        drop(src.tx);

        let summary = pipeline.run(&mut src.messages, &mut src.errors).await;
        assert_eq!(summary.messages, 3);
        assert_eq!(summary.failed_writes, 0);
        assert_eq!(summary.exit, PipelineExit::SourceEnded);

        let writes = recorded.lock().unwrap().writes.clone();
        assert_eq!(writes, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_delivery() {
        let (bad, _) = RecordingSink::failing("bad");
        let (good, recorded) = RecordingSink::new("good");
        let metrics = RelayMetrics::new("pipeline-test-failure");
        let mut pipeline = Pipeline::new(
            "pipeline-test-failure",
            FanoutSink::new(vec![Box::new(bad), Box::new(good)]),
        );
        let mut src = source();

        src.tx.send(Bytes::from("one")).await.unwrap();
        src.tx.send(Bytes::from("two")).await.unwrap();
        drop(src.tx);

        let summary = pipeline.run(&mut src.messages, &mut src.errors).await;
        assert_eq!(summary.messages, 2);
        assert_eq!(summary.failed_writes, 2);
        assert_eq!(recorded.lock().unwrap().writes.len(), 2);
        assert_eq!(metrics.sink_errors("bad"), 2);
        assert_eq!(metrics.sink_errors("good"), 0);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_pipeline() {
        let (sink, _) = RecordingSink::new("rec");
        let mut pipeline = Pipeline::new("pipeline-test-fatal", FanoutSink::new(vec![Box::new(sink)]));
        let mut src = source();

        src.err_tx
            .send(ConnectorError::ReconnectAbandoned(3))
            .await
            .unwrap();

        let summary = tokio::time::timeout(
            Duration::from_secs(1),
            pipeline.run(&mut src.messages, &mut src.errors),
        )
        .await
        .unwrap();
        assert_eq!(summary.messages, 0);
        assert_eq!(
            summary.exit,
            PipelineExit::SourceError("reconnection abandoned after 3 attempts".to_string())
        );
    }

    #[tokio::test]
    async fn test_close_signal_ends_pipeline() {
        let (sink, recorded) = RecordingSink::new("rec");
        let mut pipeline = Pipeline::new("pipeline-test-close", FanoutSink::new(vec![Box::new(sink)]));
        let mut src = source();

        src.shutdown.send_replace(true);
        // Buffered but undelivered once close is signalled
        src.tx.send(Bytes::from("late")).await.unwrap();

        let summary = pipeline.run(&mut src.messages, &mut src.errors).await;
        assert_eq!(summary.exit, PipelineExit::SourceEnded);
        assert_eq!(summary.messages, 0);

        pipeline.close().await.unwrap();
        assert_eq!(recorded.lock().unwrap().closes, 1);
        assert!(recorded.lock().unwrap().writes.is_empty());
    }
}
