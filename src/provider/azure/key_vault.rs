//! # Azure Key Vault Client
//!
//! Reads the SQL connection string from Azure Key Vault.
//!
//! Authentication uses a managed identity: the system-assigned identity by
//! default, or a user-assigned one when `AZURE_CLIENT_ID` is set. No credential
//! is read from configuration besides that client id.

use crate::config::VaultConfig;
use crate::connection_string::RawConnectionString;
use crate::constants::KEY_VAULT_SCOPE;
use crate::error::SecretError;
use crate::observability::metrics;
use crate::provider::{SecretResolver, TokenInfo};
use async_trait::async_trait;
use azure_core::credentials::{AccessToken, Secret, TokenCredential, TokenRequestOptions};
use azure_identity::{ManagedIdentityCredential, ManagedIdentityCredentialOptions, UserAssignedId};
use azure_security_keyvault_secrets::SecretClient;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, Instrument};
use typespec_client_core::time::OffsetDateTime;

/// Mock TokenCredential for Pact testing
/// Returns a dummy token without attempting real Azure authentication
#[derive(Debug)]
struct MockTokenCredential;

#[async_trait]
impl TokenCredential for MockTokenCredential {
    async fn get_token(
        &self,
        _scopes: &[&str],
        _options: Option<TokenRequestOptions<'_>>,
    ) -> azure_core::Result<AccessToken> {
        use typespec_client_core::time::Duration;

        Ok(AccessToken::new(
            Secret::new("test-token".to_string()),
            OffsetDateTime::now_utc() + Duration::seconds(3600),
        ))
    }
}

/// Body of a Key Vault `GET /secrets/{name}` response; only `value` is used
#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: Option<String>,
}

/// Pull the secret value out of a Key Vault response body
///
/// # Errors
///
/// Returns [`SecretError::Unreachable`] for a malformed body and
/// [`SecretError::EmptyValue`] when the secret has no value.
pub fn extract_secret_value(
    secret_name: &str,
    body: &[u8],
) -> Result<RawConnectionString, SecretError> {
    let bundle: SecretBundle = serde_json::from_slice(body).map_err(|e| {
        SecretError::Unreachable(format!("failed to deserialize Key Vault response: {e}"))
    })?;
    match bundle.value {
        Some(value) if !value.trim().is_empty() => Ok(RawConnectionString::from(value)),
        _ => Err(SecretError::EmptyValue(secret_name.to_string())),
    }
}

/// Whether the message reports HTTP `code` as a status, not as an arbitrary digit run
fn reports_status(error_msg: &str, code: u16) -> bool {
    let lower = error_msg.to_ascii_lowercase();
    [
        format!("status: {code}"),
        format!("status {code}"),
        format!("status code {code}"),
        format!("status code: {code}"),
        format!("statuscode({code})"),
    ]
    .iter()
    .any(|pattern| lower.contains(pattern.as_str()))
}

/// Map an Azure SDK error message onto the secret error taxonomy
fn classify(secret_name: &str, error_msg: String) -> SecretError {
    if error_msg.contains("SecretNotFound")
        || error_msg.contains("NotFound")
        || error_msg.to_ascii_lowercase().contains("not found")
        || reports_status(&error_msg, 404)
    {
        SecretError::NotFound(secret_name.to_string())
    } else if error_msg.contains("Forbidden")
        || error_msg.contains("Unauthorized")
        || error_msg.contains("ManagedIdentityCredential")
        || reports_status(&error_msg, 401)
        || reports_status(&error_msg, 403)
    {
        SecretError::IdentityDenied(error_msg)
    } else {
        SecretError::Unreachable(error_msg)
    }
}

/// Azure Key Vault secret resolver
pub struct AzureKeyVault {
    client: SecretClient,
    credential: Arc<dyn TokenCredential>,
    vault_url: String,
    vault_name: String,
}

impl std::fmt::Debug for AzureKeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureKeyVault")
            .field("vault_url", &self.vault_url)
            .finish_non_exhaustive()
    }
}

impl AzureKeyVault {
    /// Create a new Azure Key Vault resolver
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::Credential`] if the managed identity credential
    /// or the Key Vault client cannot be created.
    pub fn new(config: &VaultConfig) -> Result<Self, SecretError> {
        // Support Pact mock server integration via environment variable
        if std::env::var("PACT_MODE").is_ok() {
            let vault_url =
                std::env::var("AZURE_KEY_VAULT_ENDPOINT").unwrap_or_else(|_| config.vault_url());
            info!(
                "Pact mode enabled: routing Azure Key Vault requests to {}",
                vault_url
            );
            debug!("Pact mode: using mock Azure credential");
            return Self::with_credential(config, &vault_url, Arc::new(MockTokenCredential));
        }

        let credential: Arc<dyn TokenCredential> = match &config.managed_identity_client_id {
            Some(client_id) => {
                info!(
                    "Using user-assigned managed identity with client ID: {}",
                    client_id
                );
                let options = ManagedIdentityCredentialOptions {
                    user_assigned_id: Some(UserAssignedId::ClientId(client_id.clone())),
                    ..Default::default()
                };
                ManagedIdentityCredential::new(Some(options))
                    .map_err(|e| SecretError::Credential(e.to_string()))?
            }
            None => {
                info!("No client ID configured, using system-assigned managed identity");
                ManagedIdentityCredential::new(None)
                    .map_err(|e| SecretError::Credential(e.to_string()))?
            }
        };

        Self::with_credential(config, &config.vault_url(), credential)
    }

    /// Create a resolver with an explicit credential and endpoint
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::Credential`] if the Key Vault client cannot be created.
    pub fn with_credential(
        config: &VaultConfig,
        vault_url: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self, SecretError> {
        let client = SecretClient::new(vault_url, Arc::clone(&credential), None).map_err(|e| {
            SecretError::Credential(format!("failed to create Key Vault client: {e}"))
        })?;

        Ok(Self {
            client,
            credential,
            vault_url: vault_url.to_string(),
            vault_name: config.vault_name().to_string(),
        })
    }
}

#[async_trait]
impl SecretResolver for AzureKeyVault {
    async fn acquire_token(&self) -> Result<TokenInfo, SecretError> {
        let token = self
            .credential
            .get_token(&[KEY_VAULT_SCOPE], None)
            .await
            .map_err(|e| SecretError::IdentityDenied(e.to_string()))?;

        Ok(TokenInfo {
            expires_in_secs: (token.expires_on - OffsetDateTime::now_utc()).whole_seconds(),
        })
    }

    async fn get_secret(&self, secret_name: &str) -> Result<RawConnectionString, SecretError> {
        let span = tracing::debug_span!(
            "azure.keyvault.secret.get",
            secret.name = secret_name,
            vault.name = %self.vault_name,
            operation.success = tracing::field::Empty,
            operation.duration_ms = tracing::field::Empty,
            error.message = tracing::field::Empty,
        );
        let span_clone = span.clone();
        let start = Instant::now();

        async move {
            let result = match self.client.get_secret(secret_name, None).await {
                Ok(response) => {
                    let body = response.into_body();
                    extract_secret_value(secret_name, &body)
                }
                Err(e) => Err(classify(secret_name, e.to_string())),
            };

            let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            span_clone.record("operation.duration_ms", elapsed_ms);
            match &result {
                Ok(_) => {
                    span_clone.record("operation.success", true);
                    metrics::observe_secret_fetch_duration(start.elapsed().as_secs_f64());
                }
                Err(e) => {
                    span_clone.record("operation.success", false);
                    span_clone.record("error.message", e.to_string());
                    metrics::increment_secret_fetch_errors();
                }
            }
            result
        }
        .instrument(span)
        .await
    }
}
