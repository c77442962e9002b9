//! # Service Configuration
//!
//! Process-level settings loaded from environment variables.
//!
//! Nothing here is global: `main` builds one [`AppConfig`] at startup and hands
//! the pieces to the components that need them, so tests can construct their
//! own configuration with fakes.

use crate::constants::{DEFAULT_LISTEN_PORT, DEFAULT_SECRET_NAME, DEFAULT_SQL_CONNECT_TIMEOUT_SECS};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
}

/// Where the SQL connection string lives and which identity reads it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// Key Vault endpoint, or a bare vault name
    pub vault_uri: String,
    /// Name of the secret holding the connection string
    pub secret_name: String,
    /// Client id of a user-assigned managed identity.
    /// `None` uses the system-assigned identity.
    pub managed_identity_client_id: Option<String>,
}

impl VaultConfig {
    /// Full vault URL. Accepts `https://...` as-is, expands a bare vault name
    /// to `https://{name}.vault.azure.net/`.
    #[must_use]
    pub fn vault_url(&self) -> String {
        if self.vault_uri.starts_with("https://") || self.vault_uri.starts_with("http://") {
            self.vault_uri.clone()
        } else {
            format!("https://{}.vault.azure.net/", self.vault_uri)
        }
    }

    /// Vault name for span fields, `unknown` when the URL is not a standard vault URL
    #[must_use]
    pub fn vault_name(&self) -> &str {
        let uri = self.vault_uri.as_str();
        if !uri.contains("://") {
            return uri;
        }
        uri.strip_prefix("https://")
            .and_then(|s| s.split('.').next())
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown")
    }
}

/// Service configuration
///
/// All settings except the vault endpoint have defaults and can be overridden
/// via environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub vault: VaultConfig,
    /// HTTP listen port
    pub listen_port: u16,
    /// Upper bound on a single SQL connect attempt (seconds)
    pub sql_connect_timeout_secs: u64,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl AppConfig {
    /// Load configuration from environment variables with defaults
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when `KEY_VAULT_URI` is unset or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vault_uri = std::env::var("KEY_VAULT_URI")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("KEY_VAULT_URI"))?;

        Ok(Self {
            vault: VaultConfig {
                vault_uri,
                secret_name: env_var_or_default_str("SQL_SECRET_NAME", DEFAULT_SECRET_NAME),
                managed_identity_client_id: std::env::var("AZURE_CLIENT_ID")
                    .ok()
                    .filter(|v| !v.trim().is_empty()),
            },
            listen_port: env_var_or_default("PORT", DEFAULT_LISTEN_PORT),
            sql_connect_timeout_secs: nonzero_or_default(
                env_var_or_default("SQL_CONNECT_TIMEOUT_SECS", DEFAULT_SQL_CONNECT_TIMEOUT_SECS),
                DEFAULT_SQL_CONNECT_TIMEOUT_SECS,
            ),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "text"),
        })
    }

    /// Get SQL connect timeout duration
    ///
    /// Zero would fail every connect immediately, so it falls back to the default.
    #[must_use]
    pub fn sql_connect_timeout(&self) -> Duration {
        Duration::from_secs(nonzero_or_default(
            self.sql_connect_timeout_secs,
            DEFAULT_SQL_CONNECT_TIMEOUT_SECS,
        ))
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn nonzero_or_default(value: u64, default: u64) -> u64 {
    if value == 0 {
        default
    } else {
        value
    }
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
