//! # Metrics
//!
//! Prometheus metrics for monitoring the service.
//!
//! ## Metrics Exposed
//!
//! - `vault_records_requests_total{operation}` - Record operations started
//! - `vault_records_request_errors_total{operation,kind}` - Record operations that failed
//! - `vault_records_secret_fetch_duration_seconds` - Duration of Key Vault secret reads
//! - `vault_records_secret_fetch_errors_total` - Failed Key Vault secret reads
//! - `vault_records_sql_connect_duration_seconds` - Duration of SQL connect + login
//! - `vault_records_sql_connect_errors_total{kind}` - Failed SQL connects by kind
//! - `vault_records_records_added_total` - Records inserted

use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("vault_records_requests_total", "Total number of record operations"),
        &["operation"],
    )
    .expect("Failed to create REQUESTS_TOTAL metric - this should never happen")
});

static REQUEST_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vault_records_request_errors_total",
            "Total number of failed record operations",
        ),
        &["operation", "kind"],
    )
    .expect("Failed to create REQUEST_ERRORS_TOTAL metric - this should never happen")
});

static SECRET_FETCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "vault_records_secret_fetch_duration_seconds",
            "Duration of Key Vault secret reads in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
    )
    .expect("Failed to create SECRET_FETCH_DURATION metric - this should never happen")
});

static SECRET_FETCH_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_records_secret_fetch_errors_total",
        "Total number of failed Key Vault secret reads",
    )
    .expect("Failed to create SECRET_FETCH_ERRORS_TOTAL metric - this should never happen")
});

static SQL_CONNECT_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "vault_records_sql_connect_duration_seconds",
            "Duration of SQL Server connect and login in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create SQL_CONNECT_DURATION metric - this should never happen")
});

static SQL_CONNECT_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vault_records_sql_connect_errors_total",
            "Total number of failed SQL Server connects",
        ),
        &["kind"],
    )
    .expect("Failed to create SQL_CONNECT_ERRORS_TOTAL metric - this should never happen")
});

static RECORDS_ADDED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("vault_records_records_added_total", "Total number of records added")
        .expect("Failed to create RECORDS_ADDED_TOTAL metric - this should never happen")
});

/// Register all metrics with the registry served on `/metrics`
///
/// # Errors
///
/// Fails if a metric is registered twice.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEST_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SECRET_FETCH_DURATION.clone()))?;
    REGISTRY.register(Box::new(SECRET_FETCH_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SQL_CONNECT_DURATION.clone()))?;
    REGISTRY.register(Box::new(SQL_CONNECT_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECORDS_ADDED_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_requests(operation: &str) {
    REQUESTS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn increment_request_errors(operation: &str, kind: &str) {
    REQUEST_ERRORS_TOTAL
        .with_label_values(&[operation, kind])
        .inc();
}

pub fn observe_secret_fetch_duration(duration: f64) {
    SECRET_FETCH_DURATION.observe(duration);
}

pub fn increment_secret_fetch_errors() {
    SECRET_FETCH_ERRORS_TOTAL.inc();
}

pub fn observe_sql_connect_duration(duration: f64) {
    SQL_CONNECT_DURATION.observe(duration);
}

pub fn increment_sql_connect_errors(kind: &str) {
    SQL_CONNECT_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_records_added() {
    RECORDS_ADDED_TOTAL.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_requests() {
        let before = REQUESTS_TOTAL.with_label_values(&["list"]).get();
        increment_requests("list");
        let after = REQUESTS_TOTAL.with_label_values(&["list"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_request_errors_by_kind() {
        let before = REQUEST_ERRORS_TOTAL
            .with_label_values(&["add", "validation"])
            .get();
        increment_request_errors("add", "validation");
        let after = REQUEST_ERRORS_TOTAL
            .with_label_values(&["add", "validation"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_sql_connect_errors() {
        let before = SQL_CONNECT_ERRORS_TOTAL.with_label_values(&["timeout"]).get();
        increment_sql_connect_errors("timeout");
        assert_eq!(
            SQL_CONNECT_ERRORS_TOTAL.with_label_values(&["timeout"]).get(),
            before + 1u64
        );
    }

    #[test]
    fn test_observe_durations() {
        let secret_before = SECRET_FETCH_DURATION.get_sample_count();
        let connect_before = SQL_CONNECT_DURATION.get_sample_count();

        observe_secret_fetch_duration(0.2);
        observe_sql_connect_duration(0.4);

        assert!(SECRET_FETCH_DURATION.get_sample_count() > secret_before);
        assert!(SQL_CONNECT_DURATION.get_sample_count() > connect_before);
        assert!(SQL_CONNECT_DURATION.get_sample_sum() >= 0.4);
    }
}
