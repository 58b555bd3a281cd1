//! Prometheus metrics for the relay
//!
//! Connection and subscription gauges plus per-event pipeline and broadcast counters.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_vec, register_int_gauge, register_int_gauge_vec, Encoder, IntCounterVec,
    IntGauge, IntGaugeVec, TextEncoder,
};

const LABEL_EVENT: &str = "event";
const LABEL_TYPE: &str = "type";
const LABEL_OP: &str = "op";

/// Open WebSocket connections tracked by the registry
static CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "bchsock_connections_active",
        "WebSocket connections currently registered"
    )
    .expect("Failed to register connections_active metric")
});

/// Live subscriptions by subscription type
static SUBSCRIPTIONS_ACTIVE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "bchsock_subscriptions_active",
        "Subscriptions currently registered by type",
        &[LABEL_TYPE]
    )
    .expect("Failed to register subscriptions_active metric")
});

static EVENTS_DECODED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "bchsock_events_decoded_total",
        "Raw feed payloads decoded successfully",
        &[LABEL_EVENT]
    )
    .expect("Failed to register events_decoded_total metric")
});

static DECODE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "bchsock_decode_failures_total",
        "Raw feed payloads dropped because they failed to decode",
        &[LABEL_EVENT]
    )
    .expect("Failed to register decode_failures_total metric")
});

static BROADCASTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "bchsock_broadcasts_total",
        "Messages queued to subscribed connections",
        &[LABEL_EVENT]
    )
    .expect("Failed to register broadcasts_total metric")
});

static BROADCAST_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "bchsock_broadcast_failures_total",
        "Broadcast sends that failed and closed the connection",
        &[LABEL_EVENT]
    )
    .expect("Failed to register broadcast_failures_total metric")
});

/// Items waiting in each decode pipeline
static PIPELINE_QUEUE_DEPTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "bchsock_pipeline_queue_depth",
        "Raw payloads queued for decoding",
        &[LABEL_EVENT]
    )
    .expect("Failed to register pipeline_queue_depth metric")
});

static CONTROL_MESSAGES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "bchsock_control_messages_total",
        "Client control messages handled by op",
        &[LABEL_OP]
    )
    .expect("Failed to register control_messages_total metric")
});

/// Handle for recording metrics of one event type ("block" or "transaction")
#[derive(Clone, Debug)]
pub struct EventMetrics {
    event: &'static str,
}

impl EventMetrics {
    pub fn new(event: &'static str) -> Self {
        Self { event }
    }

    pub fn event(&self) -> &'static str {
        self.event
    }

    pub fn inc_decoded(&self) {
        EVENTS_DECODED.with_label_values(&[self.event]).inc();
    }

    pub fn inc_decode_failure(&self) {
        DECODE_FAILURES.with_label_values(&[self.event]).inc();
    }

    pub fn add_broadcasts(&self, count: usize) {
        BROADCASTS
            .with_label_values(&[self.event])
            .inc_by(count as u64);
    }

    pub fn inc_broadcast_failure(&self) {
        BROADCAST_FAILURES.with_label_values(&[self.event]).inc();
    }

    pub fn inc_queue_depth(&self) {
        PIPELINE_QUEUE_DEPTH.with_label_values(&[self.event]).inc();
    }

    pub fn dec_queue_depth(&self) {
        PIPELINE_QUEUE_DEPTH.with_label_values(&[self.event]).dec();
    }
}

pub fn inc_connections() {
    CONNECTIONS_ACTIVE.inc();
}

pub fn dec_connections() {
    CONNECTIONS_ACTIVE.dec();
}

pub fn add_subscriptions(kind: &str, delta: i64) {
    SUBSCRIPTIONS_ACTIVE.with_label_values(&[kind]).add(delta);
}

pub fn inc_control_message(op: &str) {
    CONTROL_MESSAGES.with_label_values(&[op]).inc();
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
