use async_trait::async_trait;
use tracing::warn;

use crate::error::SinkError;
use crate::traits::Sink;

/// Broadcasts every write to all member sinks.
///
/// Every sink is attempted on every call, in order, regardless of earlier
/// failures in the same call. There is no rollback: a message may land in some
/// sinks and fail in others.
pub struct FanoutSink {
    sinks: Vec<Box<dyn Sink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Box<dyn Sink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Member sink names, in delivery order
    pub fn names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    /// Write to every sink and return the names of the ones that failed
    /// alongside the aggregate result.
    pub async fn write_all(&mut self, data: &[u8]) -> (Vec<String>, Result<(), SinkError>) {
        let mut failed = Vec::new();
        let mut errors = Vec::new();
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.write(data).await {
                failed.push(sink.name().to_string());
                errors.push(format!("{}: {}", sink.name(), e));
            }
        }
        if errors.is_empty() {
            (failed, Ok(()))
        } else {
            (failed, Err(SinkError::Aggregate(errors)))
        }
    }
}

#[async_trait]
impl Sink for FanoutSink {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self.write_all(data).await.1
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        let mut errors = Vec::new();
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.close().await {
                warn!(sink = %sink.name(), error = %e, "Sink close failed");
                errors.push(format!("{}: {}", sink.name(), e));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SinkError::CloseAggregate(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let (a, a_state) = RecordingSink::failing("a");
        let (b, b_state) = RecordingSink::new("b");
        let mut fanout = FanoutSink::new(vec![Box::new(a), Box::new(b)]);

        let err = fanout.write(b"tick").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("a is down"), "{}", message);
        assert!(!message.contains("b:"), "{}", message);

        assert_eq!(a_state.lock().unwrap().writes, vec![b"tick".to_vec()]);
        assert_eq!(b_state.lock().unwrap().writes, vec![b"tick".to_vec()]);
    }

    #[tokio::test]
    async fn test_order_is_stable_after_failures() {
        let (a, a_state) = RecordingSink::new("a");
        let (b, _) = RecordingSink::failing("b");
        let (c, c_state) = RecordingSink::new("c");
        let mut fanout = FanoutSink::new(vec![Box::new(a), Box::new(b), Box::new(c)]);

        let messages: [&[u8]; 3] = [b"one", b"two", b"three"];
        for msg in messages {
            assert!(fanout.write(msg).await.is_err());
        }

        let expected = vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()];
        assert_eq!(a_state.lock().unwrap().writes, expected);
        assert_eq!(c_state.lock().unwrap().writes, expected);
    }

    #[tokio::test]
    async fn test_all_failures_are_aggregated() {
        let (a, _) = RecordingSink::failing("a");
        let (b, _) = RecordingSink::failing("b");
        let mut fanout = FanoutSink::new(vec![Box::new(a), Box::new(b)]);

        let (failed, result) = fanout.write_all(b"tick").await;
        assert_eq!(failed, vec!["a", "b"]);
        match result {
            Err(SinkError::Aggregate(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected aggregate error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_success_when_all_sinks_succeed() {
        let (a, a_state) = RecordingSink::new("a");
        let (b, b_state) = RecordingSink::new("b");
        let mut fanout = FanoutSink::new(vec![Box::new(a), Box::new(b)]);

        fanout.write(b"one").await.unwrap();
        fanout.write(b"two").await.unwrap();

        let expected = vec![b"one".to_vec(), b"two".to_vec()];
        assert_eq!(a_state.lock().unwrap().writes, expected);
        assert_eq!(b_state.lock().unwrap().writes, expected);
    }

    #[tokio::test]
    async fn test_close_attempts_every_sink() {
        let (a, a_state) = RecordingSink::with_failures("a", false, true);
        let (b, b_state) = RecordingSink::new("b");
        let (c, c_state) = RecordingSink::with_failures("c", false, true);
        let mut fanout = FanoutSink::new(vec![Box::new(a), Box::new(b), Box::new(c)]);

        let err = fanout.close().await.unwrap_err();
        assert!(matches!(err, SinkError::CloseAggregate(ref errors) if errors.len() == 2));
        let message = err.to_string();
        assert!(message.starts_with("multi sink close errors: "), "{}", message);
        assert!(message.contains("a close"));
        assert!(message.contains("c close"));

        assert_eq!(a_state.lock().unwrap().closes, 1);
        assert_eq!(b_state.lock().unwrap().closes, 1);
        assert_eq!(c_state.lock().unwrap().closes, 1);
    }

    #[tokio::test]
    async fn test_empty_fanout_succeeds() {
        let mut fanout = FanoutSink::new(Vec::new());
        assert!(fanout.is_empty());
        fanout.write(b"tick").await.unwrap();
        fanout.close().await.unwrap();
    }
}
