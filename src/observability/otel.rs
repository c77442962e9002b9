//! # Tracing Setup
//!
//! Installs the process-wide `tracing` subscriber.
//!
//! - A `tracing-subscriber` fmt layer always writes text or JSON logs,
//!   filtered by `RUST_LOG` or the configured log level.
//! - With `DD_API_KEY` present, spans are also bridged through
//!   `tracing-opentelemetry` into the `datadog-opentelemetry` provider,
//!   tagged with service, version and environment.

use anyhow::Result;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;

const SERVICE_NAME: &str = "vault-records";

/// Tracer provider handle for graceful shutdown
#[derive(Debug)]
pub enum TracerProviderHandle {
    /// Datadog tracer provider
    Datadog(SdkTracerProvider),
}

/// Filter used when `RUST_LOG` is unset
fn default_filter(log_level: &str) -> EnvFilter {
    EnvFilter::new(format!(
        "vault_records={level},tower_http={level}",
        level = log_level.to_lowercase()
    ))
}

/// Log output plus, when a provider is given, the OpenTelemetry bridge
fn build_subscriber(
    filter: EnvFilter,
    provider: Option<&SdkTracerProvider>,
    json: bool,
) -> Box<dyn tracing::Subscriber + Send + Sync> {
    let otel_layer = provider
        .map(|provider| tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME)));
    let registry = tracing_subscriber::registry().with(filter).with(otel_layer);

    if json {
        Box::new(registry.with(fmt::layer().json()))
    } else {
        Box::new(registry.with(fmt::layer()))
    }
}

/// Initialize logging and, when configured, Datadog tracing
///
/// Returns `Ok(Some(handle))` when Datadog export was set up, `Ok(None)` when
/// only the local log subscriber was installed.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(config: &AppConfig) -> Result<Option<TracerProviderHandle>> {
    let provider = std::env::var("DD_API_KEY")
        .is_ok()
        .then(init_datadog);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(&config.log_level));
    let json = config.log_format.eq_ignore_ascii_case("json");
    build_subscriber(filter, provider.as_ref(), json)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(provider.map(|provider| {
        info!(
            service = %std::env::var("DD_SERVICE").unwrap_or_default(),
            version = %std::env::var("DD_VERSION").unwrap_or_default(),
            env = ?std::env::var("DD_ENV").ok(),
            log_level = %config.log_level,
            "Datadog OpenTelemetry tracing initialized"
        );
        TracerProviderHandle::Datadog(provider)
    }))
}

/// Initialize Datadog OpenTelemetry tracing
///
/// Sets up Datadog environment variables and initializes the tracer provider.
/// Uses `BUILD_GIT_HASH` for `DD_VERSION` unless one is already set.
fn init_datadog() -> SdkTracerProvider {
    if std::env::var("DD_SERVICE").is_err() {
        std::env::set_var("DD_SERVICE", SERVICE_NAME);
    }

    if std::env::var("DD_VERSION").is_err() {
        let build_version = format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("BUILD_GIT_HASH"));
        std::env::set_var("DD_VERSION", build_version);
    }

    if std::env::var("DD_SITE").is_err() {
        std::env::set_var("DD_SITE", "datadoghq.com");
    }

    // Defaults to Datadog Agent on localhost:8126
    if std::env::var("DD_TRACE_AGENT_URL").is_err() {
        std::env::set_var("DD_TRACE_AGENT_URL", "http://localhost:8126");
    }

    datadog_opentelemetry::tracing().init()
}

/// Shutdown the tracer provider, flushing pending spans
pub fn shutdown_tracing(tracer_provider: Option<TracerProviderHandle>) {
    if let Some(TracerProviderHandle::Datadog(provider)) = tracer_provider {
        info!("Shutting down Datadog tracer provider...");
        if let Err(e) = provider.shutdown_with_timeout(Duration::from_secs(5)) {
            warn!("Error shutting down Datadog tracer provider: {}", e);
        }
    }
}
