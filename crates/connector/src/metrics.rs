//! Prometheus metrics for the relay
//!
//! Connection lifecycle counters for the session loop and delivery counters for
//! the pipeline, all labelled by feed name.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_vec, register_int_gauge_vec, Encoder, IntCounterVec, IntGaugeVec,
    TextEncoder,
};

const LABEL_FEED: &str = "feed";
const LABEL_SINK: &str = "sink";
const LABEL_REASON: &str = "reason";

/// Data frames read from the transport
static MESSAGES_RECEIVED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wsrelay_messages_received_total",
        "Data frames read from the feed transport",
        &[LABEL_FEED]
    )
    .expect("Failed to register messages_received metric")
});

/// Messages the pipeline handed to the fan-out
static MESSAGES_DELIVERED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wsrelay_messages_delivered_total",
        "Messages written to the sink set",
        &[LABEL_FEED]
    )
    .expect("Failed to register messages_delivered metric")
});

/// Per-sink write failures
static SINK_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wsrelay_sink_errors_total",
        "Failed sink writes",
        &[LABEL_FEED, LABEL_SINK]
    )
    .expect("Failed to register sink_errors metric")
});

/// Keepalive pings answered
static PINGS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wsrelay_pings_total",
        "Keepalive pings received from the feed",
        &[LABEL_FEED]
    )
    .expect("Failed to register pings metric")
});

/// Sessions that ended, by reason
static DISCONNECTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wsrelay_disconnects_total",
        "Sessions that ended before close()",
        &[LABEL_FEED, LABEL_REASON]
    )
    .expect("Failed to register disconnects metric")
});

/// Reconnect attempts (dial after backoff)
static RECONNECT_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wsrelay_reconnect_attempts_total",
        "Dial attempts made by the reconnect loop",
        &[LABEL_FEED]
    )
    .expect("Failed to register reconnect_attempts metric")
});

/// Connection status (1 = connected, 0 = disconnected)
static CONNECTED: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "wsrelay_connected",
        "Feed connection status (1=connected, 0=disconnected)",
        &[LABEL_FEED]
    )
    .expect("Failed to register connected metric")
});

/// Streams in the subscription registry
static STREAMS_SUBSCRIBED: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "wsrelay_streams_subscribed",
        "Streams currently in the subscription registry",
        &[LABEL_FEED]
    )
    .expect("Failed to register streams_subscribed metric")
});

/// Handle for recording metrics for one feed
#[derive(Clone, Debug)]
pub struct RelayMetrics {
    feed: String,
}

impl RelayMetrics {
    pub fn new(feed: impl Into<String>) -> Self {
        Self { feed: feed.into() }
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub fn inc_received(&self) {
        MESSAGES_RECEIVED.with_label_values(&[&self.feed]).inc();
    }

    pub fn inc_delivered(&self) {
        MESSAGES_DELIVERED.with_label_values(&[&self.feed]).inc();
    }

    pub fn inc_sink_error(&self, sink: &str) {
        SINK_ERRORS.with_label_values(&[&self.feed, sink]).inc();
    }

    pub fn inc_ping(&self) {
        PINGS.with_label_values(&[&self.feed]).inc();
    }

    pub fn inc_disconnect(&self, reason: &str) {
        DISCONNECTS.with_label_values(&[&self.feed, reason]).inc();
    }

    pub fn inc_reconnect_attempt(&self) {
        RECONNECT_ATTEMPTS.with_label_values(&[&self.feed]).inc();
    }

    pub fn set_connected(&self, connected: bool) {
        CONNECTED
            .with_label_values(&[&self.feed])
            .set(i64::from(connected));
    }

    pub fn set_streams_subscribed(&self, count: usize) {
        STREAMS_SUBSCRIBED
            .with_label_values(&[&self.feed])
            .set(count as i64);
    }

    pub fn received(&self) -> u64 {
        MESSAGES_RECEIVED.with_label_values(&[&self.feed]).get()
    }

    pub fn sink_errors(&self, sink: &str) -> u64 {
        SINK_ERRORS.with_label_values(&[&self.feed, sink]).get()
    }
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
    })
}
