//! # Vault Records
//!
//! Web service that keeps a `DemoRecords` table in SQL Server.
//!
//! The SQL connection string is read from Azure Key Vault on every request,
//! using the App Service / VM managed identity. Nothing sensitive is read from
//! the environment.
//!
//! See the [README.md](../README.md) for configuration and endpoints.

use anyhow::{Context, Result};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use vault_records::config::AppConfig;
use vault_records::observability::{metrics, otel};
use vault_records::provider::azure::AzureKeyVault;
use vault_records::server::{start_server, ServerState, Templates};
use vault_records::storage::MssqlConnector;
use vault_records::RecordService;

#[tokio::main]
async fn main() -> Result<()> {
    // Install the ring provider before anything opens a TLS connection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let tracer_provider = otel::init_tracing(&config).context("Failed to initialize tracing")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("BUILD_GIT_HASH"),
        built = env!("BUILD_DATETIME"),
        "Starting vault-records"
    );
    info!(
        vault = %config.vault.vault_url(),
        secret = %config.vault.secret_name,
        user_assigned_identity = config.vault.managed_identity_client_id.is_some(),
        connect_timeout_secs = config.sql_connect_timeout_secs,
        "Loaded configuration"
    );

    metrics::register_metrics()?;

    let resolver = AzureKeyVault::new(&config.vault).context("Failed to create Key Vault client")?;
    let service = RecordService::new(
        Arc::new(resolver),
        Arc::new(MssqlConnector::new()),
        config.vault.secret_name.clone(),
        config.sql_connect_timeout(),
    );
    let templates = Templates::new().context("Failed to load page templates")?;

    let state = Arc::new(ServerState::new(service, templates));
    state.is_ready.store(true, Ordering::Relaxed);

    let result = start_server(config.listen_port, state).await;

    info!("Server stopped");
    otel::shutdown_tracing(tracer_provider);

    result
}
