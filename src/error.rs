//! # Errors
//!
//! Failure taxonomy for the request pipeline. Every variant is safe to log:
//! none of them carries a password or the raw connection string.

use crate::connection_string::{SanitizedParameters, TranslationError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Secret store, identity provider, or secret lookup failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("failed to create managed identity credential: {0}")]
    Credential(String),
    #[error("identity provider denied access: {0}")]
    IdentityDenied(String),
    #[error("secret '{0}' not found in vault")]
    NotFound(String),
    #[error("secret '{0}' has no value")]
    EmptyValue(String),
    #[error("secret store unreachable: {0}")]
    Unreachable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionErrorKind {
    Timeout,
    Refused,
    AuthFailed,
}

impl ConnectionErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionErrorKind::Timeout => "timeout",
            ConnectionErrorKind::Refused => "refused",
            ConnectionErrorKind::AuthFailed => "authFailed",
        }
    }
}

impl fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a [`crate::storage::Connector`] before the target is attached
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {cause}")]
pub struct ConnectFailure {
    pub kind: ConnectionErrorKind,
    pub cause: String,
}

impl ConnectFailure {
    #[must_use]
    pub fn new(kind: ConnectionErrorKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            cause: cause.into(),
        }
    }
}

/// SQL engine unreachable or credentials rejected
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("SQL connection failed ({kind}) for {target}: {cause}")]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub cause: String,
    pub target: SanitizedParameters,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,
}

/// SQL engine rejected a statement; carries the engine's message
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("SQL statement failed: {message}")]
pub struct QueryError {
    pub message: String,
}

impl QueryError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error(transparent)]
    Translation(#[from] TranslationError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl ServiceError {
    /// Short label used for metrics and log fields
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Secret(_) => "secret",
            ServiceError::Translation(_) => "translation",
            ServiceError::Connection(_) => "connection",
            ServiceError::Validation(_) => "validation",
            ServiceError::Query(_) => "query",
        }
    }

    /// Caller-side input errors, as opposed to server faults
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServiceError::Validation(_))
    }
}
