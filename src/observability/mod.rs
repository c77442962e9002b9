//! # Observability
//!
//! Observability modules for metrics and tracing.
//!
//! - `metrics`: Prometheus metrics collection
//! - `otel`: log subscriber setup and optional Datadog trace export

pub mod metrics;
pub mod otel;
