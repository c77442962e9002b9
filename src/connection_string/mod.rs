//! # Connection Strings
//!
//! Parses the ADO.NET-style connection string stored in Key Vault and renders
//! it for a SQL client.
//!
//! - `parse`: `key=value;...` → [`ConnectionParameters`]
//! - `render`: [`ConnectionParameters`] → [`Dialect::Tds`] tuple or [`Dialect::Odbc`] string
//!
//! Nothing in this module performs I/O. Passwords are kept in [`Password`],
//! which zeroizes on drop and never prints its contents.

mod parse;
mod render;

pub use parse::parse;
pub use render::{render, OdbcConnectionString, TdsTarget, Translated};

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Unparsed secret value as stored in the vault
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RawConnectionString(String);

impl RawConnectionString {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for RawConnectionString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RawConnectionString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for RawConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawConnectionString(***)")
    }
}

/// SQL login password
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Password(String);

impl Password {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Logical connection-string fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Server,
    Port,
    Database,
    Username,
    Password,
    Encrypt,
    TrustServerCertificate,
}

impl Field {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Server => "server",
            Field::Port => "port",
            Field::Database => "database",
            Field::Username => "username",
            Field::Password => "password",
            Field::Encrypt => "encrypt",
            Field::TrustServerCertificate => "trustServerCertificate",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("connection string is missing required field(s): {}", join_fields(.0))]
    MissingFields(Vec<Field>),
    /// Only raised for non-secret fields, so the offending value is safe to report
    #[error("connection string field {field} has invalid value '{value}'")]
    InvalidValue { field: Field, value: String },
}

fn join_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(Field::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Normalized connection parameters
///
/// Transient: produced per request, owned by the call that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    /// Host name without `tcp:` prefix or `,port` suffix
    pub server: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Password,
    pub encrypt: bool,
    pub trust_server_certificate: bool,
    /// ODBC driver named in the source string, braces stripped
    pub driver: Option<String>,
}

impl ConnectionParameters {
    /// Password-free view for logs and error reports
    #[must_use]
    pub fn sanitized(&self) -> SanitizedParameters {
        SanitizedParameters {
            server: self.server.clone(),
            port: self.port,
            database: self.database.clone(),
            username: self.username.clone(),
        }
    }
}

/// Connection target without credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizedParameters {
    pub server: String,
    pub port: u16,
    pub database: String,
    pub username: String,
}

impl fmt::Display for SanitizedParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "server={}, port={}, database={}, username={}",
            self.server, self.port, self.database, self.username
        )
    }
}

/// Target format of a translated connection string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Positional `(server, username, password, database)` for the native TDS client
    Tds,
    /// Single `DRIVER={...};SERVER=...` string for ODBC drivers
    Odbc,
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tds" => Ok(Dialect::Tds),
            "odbc" => Ok(Dialect::Odbc),
            other => Err(format!("unknown dialect '{other}', expected 'tds' or 'odbc'")),
        }
    }
}

/// Parse `raw` and render it for `dialect`
///
/// # Errors
///
/// Returns [`TranslationError`] when required fields are missing or a
/// port/boolean value cannot be parsed.
pub fn translate(
    raw: &RawConnectionString,
    dialect: Dialect,
) -> Result<Translated, TranslationError> {
    let params = parse(raw)?;
    Ok(render(&params, dialect))
}
