//! Test doubles: a scripted transport and a recording sink

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::error::{ConnectorError, SinkError};
use crate::traits::{Dialer, FeedReader, FeedWriter, Frame, Sink};

/// What the manager wrote to a scripted session
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(String),
    Pong(Bytes),
    Close,
}

pub struct MockReader {
    frames: mpsc::UnboundedReceiver<Result<Frame, ConnectorError>>,
}

#[async_trait]
impl FeedReader for MockReader {
    async fn next_frame(&mut self) -> Result<Frame, ConnectorError> {
        match self.frames.recv().await {
            Some(frame) => frame,
            None => Err(ConnectorError::ConnectionClosed),
        }
    }
}

pub struct MockWriter {
    sent: mpsc::UnboundedSender<Sent>,
    fail_text: Arc<AtomicBool>,
}

#[async_trait]
impl FeedWriter for MockWriter {
    async fn send_text(&mut self, text: String) -> Result<(), ConnectorError> {
        if self.fail_text.load(Ordering::SeqCst) {
            return Err(ConnectorError::ConnectionFailed("broken pipe".into()));
        }
        self.sent.send(Sent::Text(text)).ok();
        Ok(())
    }

    async fn send_pong(&mut self, payload: Bytes) -> Result<(), ConnectorError> {
        self.sent.send(Sent::Pong(payload)).ok();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        self.sent.send(Sent::Close).ok();
        Ok(())
    }
}

/// Test-side handle of one scripted session
pub struct SessionHandle {
    pub frames: mpsc::UnboundedSender<Result<Frame, ConnectorError>>,
    pub sent: mpsc::UnboundedReceiver<Sent>,
    pub fail_text: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn data(&self, payload: &'static [u8]) {
        self.frames
            .send(Ok(Frame::Data(Bytes::from_static(payload))))
            .unwrap();
    }

    pub fn ping(&self, payload: &'static [u8]) {
        self.frames
            .send(Ok(Frame::Ping(Bytes::from_static(payload))))
            .unwrap();
    }

    pub fn fail(&self) {
        self.frames
            .send(Err(ConnectorError::ConnectionFailed("connection reset".into())))
            .unwrap();
    }

    /// Next thing the manager wrote, failing the test after two seconds
    pub async fn next_sent(&mut self) -> Sent {
        tokio::time::timeout(Duration::from_secs(2), self.sent.recv())
            .await
            .expect("timed out waiting for a write")
            .expect("writer dropped")
    }

    /// Next text write, skipping control traffic
    pub async fn next_text(&mut self) -> String {
        loop {
            if let Sent::Text(text) = self.next_sent().await {
                return text;
            }
        }
    }
}

pub fn scripted_session() -> (SessionHandle, (MockReader, MockWriter)) {
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let fail_text = Arc::new(AtomicBool::new(false));
    (
        SessionHandle {
            frames: frame_tx,
            sent: sent_rx,
            fail_text: Arc::clone(&fail_text),
        },
        (
            MockReader { frames: frame_rx },
            MockWriter {
                sent: sent_tx,
                fail_text,
            },
        ),
    )
}

type Script = Arc<Mutex<VecDeque<Result<(MockReader, MockWriter), ConnectorError>>>>;

/// Dialer that hands out pre-scripted sessions, failing once the script runs dry
#[derive(Clone, Default)]
pub struct MockDialer {
    script: Script,
    dials: Arc<Mutex<Vec<Instant>>>,
}

impl MockDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a session for the next dial and return its handle
    pub fn push_session(&self) -> SessionHandle {
        let (handle, halves) = scripted_session();
        self.script.lock().unwrap().push_back(Ok(halves));
        handle
    }

    pub fn push_failure(&self) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(ConnectorError::ConnectionFailed("refused".into())));
    }

    pub fn dial_count(&self) -> usize {
        self.dials.lock().unwrap().len()
    }

    pub fn dial_times(&self) -> Vec<Instant> {
        self.dials.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dialer for MockDialer {
    type Reader = MockReader;
    type Writer = MockWriter;

    async fn dial(&self) -> Result<(MockReader, MockWriter), ConnectorError> {
        self.dials.lock().unwrap().push(Instant::now());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ConnectorError::ConnectionFailed("no scripted session".into())))
    }
}

#[derive(Default)]
pub struct Recorded {
    pub writes: Vec<Vec<u8>>,
    pub closes: usize,
}

/// Sink that records everything it is given
pub struct RecordingSink {
    name: String,
    fail_writes: bool,
    fail_close: bool,
    state: Arc<Mutex<Recorded>>,
}

impl RecordingSink {
    pub fn new(name: &str) -> (Self, Arc<Mutex<Recorded>>) {
        Self::with_failures(name, false, false)
    }

    pub fn failing(name: &str) -> (Self, Arc<Mutex<Recorded>>) {
        Self::with_failures(name, true, false)
    }

    pub fn with_failures(
        name: &str,
        fail_writes: bool,
        fail_close: bool,
    ) -> (Self, Arc<Mutex<Recorded>>) {
        let state = Arc::new(Mutex::new(Recorded::default()));
        (
            Self {
                name: name.to_string(),
                fail_writes,
                fail_close,
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self.state.lock().unwrap().writes.push(data.to_vec());
        if self.fail_writes {
            return Err(SinkError::WriteFailed(format!("{} is down", self.name)));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.state.lock().unwrap().closes += 1;
        if self.fail_close {
            return Err(SinkError::CloseFailed(format!("{} close", self.name)));
        }
        Ok(())
    }
}
