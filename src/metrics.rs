//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // REST Metrics
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nexus_notify_api_requests_total", "Total number of notification API requests"),
        &["endpoint", "status"]
    ).expect("metric can be created");
    pub static ref API_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "nexus_notify_api_request_duration_seconds",
            "Notification API request duration in seconds"
        ).buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["endpoint"]
    ).expect("metric can be created");

    // Push Metrics
    pub static ref PUSH_MESSAGES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nexus_notify_push_messages_total", "Total number of push messages received"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref PUSH_CONNECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nexus_notify_push_connections_total", "Total number of push connection attempts"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref PUSH_RECONNECTS_SCHEDULED: IntCounter = IntCounter::new(
        "nexus_notify_push_reconnects_scheduled_total",
        "Total number of reconnect timers scheduled"
    ).expect("metric can be created");

    // State Metrics
    pub static ref UNREAD_NOTIFICATIONS: IntGauge = IntGauge::new(
        "nexus_notify_unread_notifications",
        "Current unread counter"
    ).expect("metric can be created");
    pub static ref OPTIMISTIC_REVERTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nexus_notify_optimistic_reverts_total", "Optimistic read-state changes rolled back"),
        &["operation"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
///
/// Safe to call more than once; repeated registrations are logged and
/// skipped.
pub fn init_metrics() {
    let collectors: Vec<(&str, Box<dyn prometheus::core::Collector>)> = vec![
        ("API_REQUESTS_TOTAL", Box::new(API_REQUESTS_TOTAL.clone())),
        (
            "API_REQUEST_DURATION_SECONDS",
            Box::new(API_REQUEST_DURATION_SECONDS.clone()),
        ),
        ("PUSH_MESSAGES_TOTAL", Box::new(PUSH_MESSAGES_TOTAL.clone())),
        ("PUSH_CONNECTIONS_TOTAL", Box::new(PUSH_CONNECTIONS_TOTAL.clone())),
        (
            "PUSH_RECONNECTS_SCHEDULED",
            Box::new(PUSH_RECONNECTS_SCHEDULED.clone()),
        ),
        ("UNREAD_NOTIFICATIONS", Box::new(UNREAD_NOTIFICATIONS.clone())),
        (
            "OPTIMISTIC_REVERTS_TOTAL",
            Box::new(OPTIMISTIC_REVERTS_TOTAL.clone()),
        ),
    ];

    for (name, collector) in collectors {
        if let Err(error) = REGISTRY.register(collector) {
            tracing::debug!(metric = name, %error, "Metric already registered");
        }
    }

    tracing::info!("Metrics registry initialized");
}

/// Render the registry in the Prometheus text exposition format
pub fn render() -> Result<String, crate::error::NotifyError> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| crate::error::NotifyError::Internal(e.into()))?;

    String::from_utf8(buffer).map_err(|e| crate::error::NotifyError::Internal(e.into()))
}
