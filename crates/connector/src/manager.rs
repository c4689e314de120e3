//! Connection manager
//!
//! Owns the feed session for its whole lifetime: dials the transport, answers
//! keepalive pings, detects dead sessions, backs off, reconnects and replays
//! the subscription registry on every new session.
//!
//! The active session's write half and the subscription registry sit behind a
//! single lock. Only the session loop installs a session; public calls either
//! write through it or remove it (after a failed write), never replace it.

use bytes::Bytes;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, trace, warn};
use wsrelay_metadata::ConnectionSettings;

use crate::backoff::Backoff;
use crate::error::ConnectorError;
use crate::metrics::RelayMetrics;
use crate::protocol::{StreamMethod, StreamRequest};
use crate::subscription::SubscriptionRegistry;
use crate::traits::{Dialer, FeedReader, FeedWriter, Frame};

/// Capacity of the fatal error queue
const ERROR_QUEUE_CAPACITY: usize = 10;

/// Session timing and queueing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Idle window; any frame (data or ping) restarts it
    pub read_timeout: Duration,
    /// Deadline for each write (pongs and stream requests)
    pub write_timeout: Duration,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    /// Inbound queue capacity; the read loop blocks when it is full
    pub queue_capacity: usize,
    /// Consecutive failed reconnect attempts before giving up (None = never)
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from(&ConnectionSettings::default())
    }
}

impl From<&ConnectionSettings> for ConnectionConfig {
    fn from(settings: &ConnectionSettings) -> Self {
        Self {
            read_timeout: Duration::from_secs(settings.read_timeout_secs),
            write_timeout: Duration::from_secs(settings.write_timeout_secs),
            backoff_min: Duration::from_secs(settings.backoff_min_secs),
            backoff_max: Duration::from_secs(settings.backoff_max_secs),
            queue_capacity: settings.queue_capacity,
            max_reconnect_attempts: settings.max_reconnect_attempts,
        }
    }
}

/// Inbound message sequence. Ends once the manager is closed (buffered
/// messages included) or the session loop stops.
pub struct Messages {
    rx: mpsc::Receiver<Bytes>,
    shutdown: watch::Receiver<bool>,
}

impl Messages {
    pub(crate) fn from_parts(rx: mpsc::Receiver<Bytes>, shutdown: watch::Receiver<bool>) -> Self {
        Self { rx, shutdown }
    }

    /// Next message, or `None` once the sequence has ended
    pub async fn recv(&mut self) -> Option<Bytes> {
        tokio::select! {
            biased;
            _ = closed(&mut self.shutdown) => None,
            msg = self.rx.recv() => msg,
        }
    }
}

/// Resolves once close has been signalled. A dropped sender counts as closed.
async fn closed(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|closed| *closed).await;
}

struct Session<W> {
    id: u64,
    writer: W,
    // Dropping the session wakes the read loop of this session
    _alive: oneshot::Sender<()>,
}

struct Shared<W> {
    session: Option<Session<W>>,
    registry: SubscriptionRegistry,
}

/// Read side of an established session, owned by the session loop
struct Live<R> {
    id: u64,
    reader: R,
    alive: oneshot::Receiver<()>,
}

enum SessionEnd {
    Closed,
    ConsumerGone,
    Failed(ConnectorError),
}

fn disconnect_reason(err: &ConnectorError) -> &'static str {
    match err {
        ConnectorError::ReadTimeout(_) => "read_timeout",
        ConnectorError::WriteTimeout(_) => "write_timeout",
        ConnectorError::ConnectionClosed => "peer_closed",
        ConnectorError::Invalidated => "invalidated",
        _ => "error",
    }
}

fn take<T>(slot: &StdMutex<Option<T>>) -> Option<T> {
    slot.lock().ok().and_then(|mut guard| guard.take())
}

fn restore<T>(slot: &StdMutex<Option<T>>, value: T) {
    if let Ok(mut guard) = slot.lock() {
        *guard = Some(value);
    }
}

struct Inner<D: Dialer> {
    dialer: D,
    config: ConnectionConfig,
    metrics: RelayMetrics,
    shared: Mutex<Shared<D::Writer>>,
    started: AtomicBool,
    closed: AtomicBool,
    connected: Arc<AtomicBool>,
    next_request_id: AtomicU64,
    next_session_id: AtomicU64,
    shutdown: watch::Sender<bool>,
    msg_tx: StdMutex<Option<mpsc::Sender<Bytes>>>,
    msg_rx: StdMutex<Option<mpsc::Receiver<Bytes>>>,
    err_tx: mpsc::Sender<ConnectorError>,
    err_rx: StdMutex<Option<mpsc::Receiver<ConnectorError>>>,
}

/// Resilient feed connection. Cheap to clone; all clones share one session.
pub struct ConnectionManager<D: Dialer> {
    inner: Arc<Inner<D>>,
}

impl<D: Dialer> Clone for ConnectionManager<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Dialer> ConnectionManager<D> {
    pub fn new(feed: impl Into<String>, dialer: D, config: ConnectionConfig) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (err_tx, err_rx) = mpsc::channel(ERROR_QUEUE_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                dialer,
                config,
                metrics: RelayMetrics::new(feed),
                shared: Mutex::new(Shared {
                    session: None,
                    registry: SubscriptionRegistry::new(),
                }),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                connected: Arc::new(AtomicBool::new(false)),
                next_request_id: AtomicU64::new(1),
                next_session_id: AtomicU64::new(1),
                shutdown,
                msg_tx: StdMutex::new(Some(msg_tx)),
                msg_rx: StdMutex::new(Some(msg_rx)),
                err_tx,
                err_rx: StdMutex::new(Some(err_rx)),
            }),
        }
    }

    /// Dial the feed and start the session loop.
    ///
    /// Only the first dial's failure is reported; once the loop is running,
    /// failures are retried internally. Calling this again while started is
    /// a no-op.
    pub async fn connect(&self) -> Result<(), ConnectorError> {
        let inner = &self.inner;
        if inner.is_closed() {
            return Err(ConnectorError::Closed);
        }
        if inner
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(feed = %inner.metrics.feed(), "Session loop already started");
            return Ok(());
        }

        let Some(tx) = take(&inner.msg_tx) else {
            inner.started.store(false, Ordering::SeqCst);
            return Err(ConnectorError::ConnectionFailed(
                "message queue unavailable".to_string(),
            ));
        };

        match inner.establish().await {
            Ok(live) => {
                info!(feed = %inner.metrics.feed(), session = live.id, "Connected to feed");
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move { inner.run(live, tx).await });
                Ok(())
            }
            Err(e) => {
                error!(feed = %inner.metrics.feed(), error = %e, "Initial connection failed");
                restore(&inner.msg_tx, tx);
                inner.started.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Add streams to the registry and, when connected, request them now
    pub async fn subscribe(&self, streams: &[String], request_id: u64) -> Result<(), ConnectorError> {
        self.inner
            .update(StreamMethod::Subscribe, streams, request_id)
            .await
    }

    /// Remove streams from the registry and, when connected, drop them now
    pub async fn unsubscribe(
        &self,
        streams: &[String],
        request_id: u64,
    ) -> Result<(), ConnectorError> {
        self.inner
            .update(StreamMethod::Unsubscribe, streams, request_id)
            .await
    }

    /// Take the inbound message sequence. Returns `None` if already taken.
    pub fn messages(&self) -> Option<Messages> {
        take(&self.inner.msg_rx).map(|rx| Messages::from_parts(rx, self.inner.shutdown.subscribe()))
    }

    /// Take the fatal error queue. Returns `None` if already taken.
    pub fn errors(&self) -> Option<mpsc::Receiver<ConnectorError>> {
        take(&self.inner.err_rx)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Shared connected flag, for readiness reporting
    pub fn connected_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.inner.connected)
    }

    /// Sorted snapshot of the subscription registry
    pub async fn subscriptions(&self) -> Vec<String> {
        self.inner.shared.lock().await.registry.snapshot()
    }

    /// Identity of the active session, if any
    pub async fn session_id(&self) -> Option<u64> {
        self.inner.shared.lock().await.session.as_ref().map(|s| s.id)
    }

    /// Stop the session loop and close the active session.
    ///
    /// Only the first call does anything; later and concurrent calls return
    /// immediately.
    pub async fn close(&self) -> Result<(), ConnectorError> {
        let inner = &self.inner;
        if inner
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        info!(feed = %inner.metrics.feed(), "Closing feed connection");
        inner.shutdown.send_replace(true);

        let session = inner.shared.lock().await.session.take();
        inner.set_connected(false);
        if let Some(mut session) = session {
            inner.write_bounded(session.writer.close()).await?;
        }
        Ok(())
    }
}

impl<D: Dialer> Inner<D> {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        self.metrics.set_connected(connected);
    }

    async fn write_bounded<F>(&self, write: F) -> Result<(), ConnectorError>
    where
        F: Future<Output = Result<(), ConnectorError>>,
    {
        match timeout(self.config.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(ConnectorError::WriteTimeout(self.config.write_timeout)),
        }
    }

    /// Dial, replay the registry and install the new session.
    ///
    /// The replay and the install happen under the same lock, so a concurrent
    /// subscribe either lands in the replayed set or is written to the new
    /// session itself.
    async fn establish(&self) -> Result<Live<D::Reader>, ConnectorError> {
        let (reader, mut writer) = self.dialer.dial().await?;

        let mut shared = self.shared.lock().await;
        if self.is_closed() {
            let _ = self.write_bounded(writer.close()).await;
            return Err(ConnectorError::Closed);
        }

        if !shared.registry.is_empty() {
            let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
            let streams = shared.registry.snapshot();
            let payload = StreamRequest::subscribe(streams.clone(), request_id).to_json()?;
            if let Err(e) = self.write_bounded(writer.send_text(payload)).await {
                let _ = self.write_bounded(writer.close()).await;
                return Err(ConnectorError::ResubscribeFailed(e.to_string()));
            }
            info!(
                feed = %self.metrics.feed(),
                request_id,
                streams = ?streams,
                "Replayed subscriptions"
            );
        }

        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let (alive_tx, alive_rx) = oneshot::channel();
        shared.session = Some(Session {
            id,
            writer,
            _alive: alive_tx,
        });
        self.set_connected(true);

        Ok(Live {
            id,
            reader,
            alive: alive_rx,
        })
    }

    async fn update(
        &self,
        method: StreamMethod,
        streams: &[String],
        request_id: u64,
    ) -> Result<(), ConnectorError> {
        if self.is_closed() {
            return Err(ConnectorError::Closed);
        }

        let mut shared = self.shared.lock().await;
        match method {
            StreamMethod::Subscribe => shared.registry.insert(streams),
            StreamMethod::Unsubscribe => shared.registry.remove(streams),
        };
        self.metrics.set_streams_subscribed(shared.registry.len());

        let Some(session) = shared.session.as_mut() else {
            debug!(
                feed = %self.metrics.feed(),
                ?method,
                streams = ?streams,
                "Not connected, request deferred to next session"
            );
            return Ok(());
        };

        let session_id = session.id;
        let payload = StreamRequest {
            method,
            params: streams.to_vec(),
            id: request_id,
        }
        .to_json()?;

        let written = self.write_bounded(session.writer.send_text(payload)).await;
        match written {
            Ok(()) => {
                info!(
                    feed = %self.metrics.feed(),
                    ?method,
                    request_id,
                    streams = ?streams,
                    "Stream request sent"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    feed = %self.metrics.feed(),
                    session = session_id,
                    error = %e,
                    "Stream request failed, dropping session"
                );
                if let Some(mut dead) = shared.session.take() {
                    let _ = self.write_bounded(dead.writer.close()).await;
                }
                self.set_connected(false);
                Err(e)
            }
        }
    }

    /// Echo a keepalive payload on the session it arrived on
    async fn acknowledge(&self, session_id: u64, payload: Bytes) -> Result<(), ConnectorError> {
        let mut shared = self.shared.lock().await;
        match shared.session.as_mut() {
            Some(session) if session.id == session_id => {
                self.write_bounded(session.writer.send_pong(payload)).await
            }
            _ => Err(ConnectorError::Invalidated),
        }
    }

    /// Remove and close the session if it is still the active one
    async fn discard_session(&self, session_id: u64) {
        let session = {
            let mut shared = self.shared.lock().await;
            if shared.session.as_ref().is_some_and(|s| s.id == session_id) {
                shared.session.take()
            } else {
                None
            }
        };
        self.set_connected(false);
        if let Some(mut session) = session {
            if let Err(e) = self.write_bounded(session.writer.close()).await {
                debug!(session = session_id, error = %e, "Error closing dead session");
            }
        }
    }

    /// Session loop: Connected -> Backoff -> Dialing -> Connected ... until close
    async fn run(self: Arc<Self>, mut live: Live<D::Reader>, tx: mpsc::Sender<Bytes>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut backoff = Backoff::new(self.config.backoff_min, self.config.backoff_max);

        'sessions: loop {
            let reason = match self.read_session(&mut live, &tx, &mut shutdown).await {
                SessionEnd::Closed => break 'sessions,
                SessionEnd::ConsumerGone => {
                    info!(feed = %self.metrics.feed(), "Message consumer dropped, stopping");
                    break 'sessions;
                }
                SessionEnd::Failed(e) => e,
            };

            let lost = live.id;
            warn!(
                feed = %self.metrics.feed(),
                session = lost,
                error = %reason,
                "Feed session lost"
            );
            self.metrics.inc_disconnect(disconnect_reason(&reason));
            // Release the read half now; only the id survives the backoff
            drop(live);
            self.discard_session(lost).await;

            let mut attempts: u32 = 0;
            live = loop {
                if let Some(max) = self.config.max_reconnect_attempts {
                    if attempts >= max {
                        error!(
                            feed = %self.metrics.feed(),
                            attempts,
                            "Giving up on reconnection"
                        );
                        let _ = self.err_tx.try_send(ConnectorError::ReconnectAbandoned(attempts));
                        break 'sessions;
                    }
                }

                let delay = backoff.next_delay();
                info!(
                    feed = %self.metrics.feed(),
                    delay_ms = delay.as_millis() as u64,
                    attempt = attempts + 1,
                    "Reconnecting after backoff"
                );
                tokio::select! {
                    biased;
                    _ = closed(&mut shutdown) => break 'sessions,
                    _ = sleep(delay) => {}
                }

                attempts += 1;
                self.metrics.inc_reconnect_attempt();
                let result = tokio::select! {
                    biased;
                    _ = closed(&mut shutdown) => break 'sessions,
                    result = self.establish() => result,
                };

                match result {
                    Ok(next) => {
                        backoff.reset();
                        info!(
                            feed = %self.metrics.feed(),
                            session = next.id,
                            attempts,
                            "Reconnected to feed"
                        );
                        break next;
                    }
                    Err(ConnectorError::ResubscribeFailed(e)) => {
                        // The dial itself worked
                        backoff.reset();
                        warn!(feed = %self.metrics.feed(), error = %e, "Resubscribe failed");
                    }
                    Err(ConnectorError::Closed) => break 'sessions,
                    Err(e) => {
                        warn!(feed = %self.metrics.feed(), error = %e, attempt = attempts, "Redial failed");
                    }
                }
            };
        }

        let session = self.shared.lock().await.session.take();
        if let Some(mut session) = session {
            let _ = self.write_bounded(session.writer.close()).await;
        }
        self.set_connected(false);
        debug!(feed = %self.metrics.feed(), "Session loop stopped");
    }

    async fn read_session(
        &self,
        live: &mut Live<D::Reader>,
        tx: &mpsc::Sender<Bytes>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        loop {
            let read = tokio::select! {
                biased;
                _ = closed(shutdown) => return SessionEnd::Closed,
                _ = &mut live.alive => return SessionEnd::Failed(ConnectorError::Invalidated),
                read = timeout(self.config.read_timeout, live.reader.next_frame()) => read,
            };

            let frame = match read {
                Err(_) => {
                    return SessionEnd::Failed(ConnectorError::ReadTimeout(self.config.read_timeout))
                }
                Ok(Err(e)) => return SessionEnd::Failed(e),
                Ok(Ok(frame)) => frame,
            };

            match frame {
                Frame::Data(data) => {
                    self.metrics.inc_received();
                    // Blocks while the queue is full; close still gets through
                    tokio::select! {
                        biased;
                        _ = closed(shutdown) => return SessionEnd::Closed,
                        sent = tx.send(data) => {
                            if sent.is_err() {
                                return SessionEnd::ConsumerGone;
                            }
                        }
                    }
                }
                Frame::Ping(payload) => {
                    self.metrics.inc_ping();
                    trace!(session = live.id, len = payload.len(), "Received ping, sending pong");
                    if let Err(e) = self.acknowledge(live.id, payload).await {
                        return SessionEnd::Failed(e);
                    }
                }
                Frame::Control => trace!(session = live.id, "Received control frame"),
            }
        }
    }
}
