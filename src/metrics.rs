//! Metrics instrumentation for the driver.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `nosql_driver_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: Get, Put, Delete, Query, GetTable
//! - `status`: success, error, timeout

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a completed request
pub fn record_request(operation: &str, status: &str) {
    counter!(
        "nosql_driver_requests_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record one retry of a request
pub fn record_retry(operation: &str) {
    counter!(
        "nosql_driver_retries_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record time a request spent waiting on rate limiters
pub fn record_rate_delay(operation: &str, delay: Duration) {
    histogram!(
        "nosql_driver_rate_delay_seconds",
        "operation" => operation.to_string()
    )
    .record(delay.as_secs_f64());
}

/// Set the number of tables with active limiters
pub fn set_rate_limited_tables(count: usize) {
    gauge!("nosql_driver_rate_limited_tables").set(count as f64);
}
