//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_admission_rejected_total` (counter): rejections by reason
//! - `gateway_requests_total` (counter): dispatched requests by method, outcome
//! - `gateway_outbound_attempts_total` (counter): upstream attempts by outcome
//! - `gateway_outbound_rate_limited_total` (counter): token bucket rejections
//! - `gateway_outbound_in_flight` (gauge): held concurrency permits
//! - `gateway_outbound_duration_seconds` (histogram): per-attempt latency
//! - `gateway_cancellations_total` (counter): cancel notifications by whether
//!   the target was still in flight

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const ADMISSION_REJECTED_TOTAL: &str = "gateway_admission_rejected_total";
pub const REQUESTS_TOTAL: &str = "gateway_requests_total";
pub const OUTBOUND_ATTEMPTS_TOTAL: &str = "gateway_outbound_attempts_total";
pub const OUTBOUND_RATE_LIMITED_TOTAL: &str = "gateway_outbound_rate_limited_total";
pub const OUTBOUND_IN_FLIGHT: &str = "gateway_outbound_in_flight";
pub const OUTBOUND_DURATION_SECONDS: &str = "gateway_outbound_duration_seconds";
pub const CANCELLATIONS_TOTAL: &str = "gateway_cancellations_total";

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        ADMISSION_REJECTED_TOTAL,
        Unit::Count,
        "Inbound requests rejected before dispatch."
    );
    describe_counter!(REQUESTS_TOTAL, Unit::Count, "JSON-RPC requests dispatched.");
    describe_counter!(
        OUTBOUND_ATTEMPTS_TOTAL,
        Unit::Count,
        "Attempts made against the upstream API."
    );
    describe_counter!(
        OUTBOUND_RATE_LIMITED_TOTAL,
        Unit::Count,
        "Outbound calls rejected by the token bucket."
    );
    describe_gauge!(OUTBOUND_IN_FLIGHT, "Outbound calls holding a concurrency permit.");
    describe_histogram!(
        OUTBOUND_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of individual upstream attempts."
    );
    describe_counter!(
        CANCELLATIONS_TOTAL,
        Unit::Count,
        "Cancellation notifications received."
    );
}

pub fn record_admission_rejected(reason: &'static str) {
    counter!(ADMISSION_REJECTED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_request(method: &str, outcome: &'static str) {
    counter!(REQUESTS_TOTAL, "method" => method.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_outbound_attempt(outcome: &'static str, duration: Duration) {
    counter!(OUTBOUND_ATTEMPTS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(OUTBOUND_DURATION_SECONDS).record(duration.as_secs_f64());
}

pub fn record_outbound_rate_limited() {
    counter!(OUTBOUND_RATE_LIMITED_TOTAL).increment(1);
}

pub fn record_outbound_in_flight(count: usize) {
    gauge!(OUTBOUND_IN_FLIGHT).set(count as f64);
}

pub fn record_cancellation(found: bool) {
    counter!(CANCELLATIONS_TOTAL, "found" => if found { "true" } else { "false" }).increment(1);
}
