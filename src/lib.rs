//! Vault Records Library
//!
//! Record-keeping service whose SQL Server credential lives in Azure Key Vault.
//!
//! - `connection_string`: parse ADO.NET-style strings, render TDS or ODBC targets
//! - `provider`: secret stores (`azure::AzureKeyVault`)
//! - `storage`: SQL connector seam and the `tiberius` implementation
//! - `service`: record operations and the status pipeline
//! - `server`: axum routes

pub mod config;
pub mod connection_string;
pub mod constants;
pub mod error;
pub mod observability;
pub mod provider;
pub mod server;
pub mod service;
pub mod storage;

pub use config::{AppConfig, VaultConfig};
pub use error::ServiceError;
pub use service::RecordService;
