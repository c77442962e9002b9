//! # Secret Providers
//!
//! Secret stores the service can read its connection string from.
//!
//! Each provider implements [`SecretResolver`]; `azure` reads Azure Key Vault
//! with a managed identity.

use crate::connection_string::RawConnectionString;
use crate::error::SecretError;
use async_trait::async_trait;

/// Access token metadata; the token itself stays inside the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    /// Seconds until the token expires
    pub expires_in_secs: i64,
}

/// Provider trait for secret stores
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Request an access token from the identity provider
    async fn acquire_token(&self) -> Result<TokenInfo, SecretError>;

    /// Get the latest value of a secret
    async fn get_secret(&self, secret_name: &str) -> Result<RawConnectionString, SecretError>;
}

pub mod azure;
