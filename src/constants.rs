//! # Constants
//!
//! Shared constants used throughout the service.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable (see [`crate::config::AppConfig`]).

/// Default HTTP listen port
pub const DEFAULT_LISTEN_PORT: u16 = 8000;

/// Default name of the Key Vault secret holding the SQL connection string
pub const DEFAULT_SECRET_NAME: &str = "sql-conn-string";

/// Default SQL connect timeout (seconds)
pub const DEFAULT_SQL_CONNECT_TIMEOUT_SECS: u64 = 5;

/// SQL Server port used when the connection string does not name one
pub const DEFAULT_SQL_PORT: u16 = 1433;

/// ODBC driver appended when the connection string does not name one
pub const DEFAULT_ODBC_DRIVER: &str = "ODBC Driver 18 for SQL Server";

/// OAuth scope requested from the identity provider for Key Vault access
pub const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";
