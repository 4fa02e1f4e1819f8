//! Prometheus metrics collection for sqlgate.
//!
//! Exposed on a separate HTTP port (see [`crate::http::run_metrics_server`]).
//!
//! - `sqlgate_queries_total{route,outcome}` - Requests handled per route, by outcome
//! - `sqlgate_query_duration_seconds{route}` - Request latency per route
//! - `sqlgate_key_verifications_total{result}` - API key verification results
//!
//! Recording before [`init`] is a no-op, so library users and tests need not
//! set anything up.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Requests handled per route and outcome (`ok` or an error code).
pub static QUERY_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// Request latency per route.
pub static QUERY_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// API key verification results (`valid`, `invalid`, `expired`, `missing_secret`).
pub static KEY_VERIFICATIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::error!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(QUERY_COUNTER, IntCounterVec::new(
        Opts::new("sqlgate_queries_total", "Query requests handled by route and outcome"),
        &["route", "outcome"]));
    register!(QUERY_LATENCY, HistogramVec::new(
        HistogramOpts::new("sqlgate_query_duration_seconds", "Query request latency by route")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["route"]));
    register!(KEY_VERIFICATIONS, IntCounterVec::new(
        Opts::new("sqlgate_key_verifications_total", "API key verification results"),
        &["result"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record a handled request.
#[inline]
pub fn record_query(route: &str, outcome: &str) {
    if let Some(c) = QUERY_COUNTER.get() {
        c.with_label_values(&[route, outcome]).inc();
    }
}

/// Record request latency.
#[inline]
pub fn record_latency(route: &str, duration_secs: f64) {
    if let Some(h) = QUERY_LATENCY.get() {
        h.with_label_values(&[route]).observe(duration_secs);
    }
}

/// Record an API key verification result.
#[inline]
pub fn record_verification(result: &str) {
    if let Some(c) = KEY_VERIFICATIONS.get() {
        c.with_label_values(&[result]).inc();
    }
}
