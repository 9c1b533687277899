//! Metrics tracking middleware
//!
//! Tracks request latency, counts, and status codes, plus authentication
//! events, in a Prometheus registry rendered at `GET /metrics`.
//!
//! Author: hephaex@gmail.com

use axum::{extract::Request, middleware::Next, response::Response};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_with_registry, Encoder, HistogramVec, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};
use std::time::Instant;

lazy_static! {
    static ref REGISTRY: Registry = {
        let registry = Registry::new_custom(Some("warden".to_string()), None).unwrap_or_default();
        #[cfg(target_os = "linux")]
        if let Err(e) = registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        )) {
            tracing::warn!(error = %e, "Process metrics unavailable");
        }
        registry
    };

    static ref HTTP_REQUESTS: Option<IntCounterVec> = register_int_counter_vec_with_registry!(
        "http_requests_total",
        "HTTP requests by method, endpoint and status",
        &["method", "endpoint", "status"],
        REGISTRY
    )
    .ok();

    static ref HTTP_DURATION: Option<HistogramVec> = register_histogram_vec_with_registry!(
        "http_request_duration_seconds",
        "HTTP request latency by method and endpoint",
        &["method", "endpoint"],
        REGISTRY
    )
    .ok();

    static ref AUTH_EVENTS: Option<IntCounterVec> = register_int_counter_vec_with_registry!(
        "auth_events_total",
        "Authentication events by kind and outcome",
        &["event", "outcome"],
        REGISTRY
    )
    .ok();

    static ref UPTIME: Option<IntGauge> = register_int_gauge_with_registry!(
        "uptime_seconds",
        "Time since server start",
        REGISTRY
    )
    .ok();
}

/// Metrics tracking middleware
///
/// Records:
/// - Request count per method, endpoint and status
/// - Request latency distribution
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    // Normalize the path for metrics (remove IDs)
    let endpoint = normalize_endpoint(request.uri().path());

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    if let Some(requests) = HTTP_REQUESTS.as_ref() {
        requests
            .with_label_values(&[&method, &endpoint, &status])
            .inc();
    }
    if let Some(duration) = HTTP_DURATION.as_ref() {
        duration
            .with_label_values(&[&method, &endpoint])
            .observe(start.elapsed().as_secs_f64());
    }

    response
}

/// Count an authentication event
pub fn record_auth_event(event: &str, outcome: &str) {
    if let Some(events) = AUTH_EVENTS.as_ref() {
        events.with_label_values(&[event, outcome]).inc();
    }
}

/// Render the registry in the Prometheus text format
pub fn render(uptime_secs: u64) -> String {
    if let Some(uptime) = UPTIME.as_ref() {
        uptime.set(uptime_secs as i64);
    }

    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Normalize endpoint paths for consistent metrics
///
/// Replaces UUID/ID segments with placeholders to group similar endpoints
fn normalize_endpoint(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if is_uuid(seg) || is_numeric(seg) {
                ":id"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a string looks like a UUID
fn is_uuid(s: &str) -> bool {
    s.len() == 36
        && s.chars().enumerate().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

/// Check if a string is numeric (likely an ID)
fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}
