//! # Azure Providers
//!
//! - `key_vault`: Azure Key Vault for the SQL connection string

pub mod key_vault;

pub use key_vault::AzureKeyVault;
