//! Kernel metrics
//!
//! Custom collectors live on the crate [`REGISTRY`]; the autometrics function
//! metrics of the public API live on the autometrics exporter. Both are
//! rendered by [`gather_metrics`] in the Prometheus text format. Serving them
//! over HTTP is left to the embedding process.

use std::sync::Once;

use autometrics::prometheus_exporter;
use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::warn;

lazy_static! {
    pub static ref OPERATION_COUNTER: IntCounterVec = IntCounterVec::new(
        Opts::new("keeper_operations_total", "Submitted operations by kind and outcome"),
        &["op", "outcome"]
    )
    .expect("metric can not be created");

    pub static ref MULTI_BATCH_SIZE: HistogramVec = HistogramVec::new(
        HistogramOpts::new("keeper_multi_batch_size", "Number of ops per multi request")
            .buckets(exponential_buckets(1.0, 2.0, 10).expect("valid buckets")),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref ACTIVE_SESSIONS: IntGauge =
        IntGauge::new("keeper_active_sessions", "Sessions in CONNECTED state")
            .expect("metric can not be created");

    pub static ref REGISTERED_WATCHES: IntGauge =
        IntGauge::new("keeper_registered_watches", "Watch registrations currently held")
            .expect("metric can not be created");

    pub static ref DELIVERED_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("keeper_delivered_events_total", "Watch events handed to the dispatcher"),
        &["event_type"]
    )
    .expect("metric can not be created");

    pub static ref EXPIRED_SESSIONS: IntCounter =
        IntCounter::new("keeper_expired_sessions_total", "Sessions terminated by timeout")
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static INIT: Once = Once::new();

pub fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(OPERATION_COUNTER.clone()),
        Box::new(MULTI_BATCH_SIZE.clone()),
        Box::new(ACTIVE_SESSIONS.clone()),
        Box::new(REGISTERED_WATCHES.clone()),
        Box::new(DELIVERED_EVENTS.clone()),
        Box::new(EXPIRED_SESSIONS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            warn!("collector can not be registered: {}", e);
        }
    }
}

/// Register the custom collectors on [`REGISTRY`]; safe to call repeatedly.
pub fn init_metrics() {
    INIT.call_once(|| register_custom_metrics(&REGISTRY));
}

/// Render custom and autometrics metrics in the Prometheus text format.
pub fn gather_metrics() -> String {
    init_metrics();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!("could not encode custom metrics: {}", e);
    }
    let mut body = match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            warn!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };

    let autometrics_response = prometheus_exporter::encode_http_response();
    if autometrics_response.status().is_success() {
        body.push_str(&autometrics_response.into_body());
    }
    body
}

#[cfg(test)]
mod metrics_test;
