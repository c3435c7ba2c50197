//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Once;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // OAuth initiation
    pub static ref OAUTH_INIT_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authrelay_oauth_init_total", "Total number of OAuth initiations by outcome"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref AUTHORITY_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "authrelay_authority_request_duration_seconds",
            "Session authority request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["status"]
    ).expect("metric can be created");
    pub static ref FORWARDED_COOKIES_TOTAL: IntCounter = IntCounter::new(
        "authrelay_forwarded_cookies_total",
        "Total number of authority cookies rewritten and forwarded"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authrelay_errors_total", "Total number of errors"),
        &["error_type", "endpoint"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; registration happens on the first call.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(OAUTH_INIT_TOTAL.clone()))
            .expect("OAUTH_INIT_TOTAL can be registered");
        REGISTRY
            .register(Box::new(AUTHORITY_REQUEST_DURATION_SECONDS.clone()))
            .expect("AUTHORITY_REQUEST_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(FORWARDED_COOKIES_TOTAL.clone()))
            .expect("FORWARDED_COOKIES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}
