//! # Storage
//!
//! Seam between the record service and the SQL engine.
//!
//! A [`Connector`] opens one [`RecordConnection`] per request; the service
//! closes it before returning. `mssql` provides the SQL Server implementation.

pub mod mssql;

use crate::connection_string::TdsTarget;
use crate::error::{ConnectFailure, QueryError};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;

pub use mssql::MssqlConnector;

/// A row of `DemoRecords`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: i64,
    pub name: String,
    pub created_at: NaiveDateTime,
}

/// Opens connections to the record store
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open and authenticate a new connection
    ///
    /// Callers bound this with a timeout and drop the future on expiry, so
    /// implementations must not leave anything behind when cancelled.
    async fn connect(&self, target: &TdsTarget) -> Result<Box<dyn RecordConnection>, ConnectFailure>;
}

/// One open connection
#[async_trait]
pub trait RecordConnection: Send {
    /// All records, newest (highest id) first
    async fn fetch_records(&mut self) -> Result<Vec<Record>, QueryError>;

    /// The record with the highest id, if any
    async fn latest_record(&mut self) -> Result<Option<Record>, QueryError>;

    /// Insert with `name` bound as a parameter and commit; returns the new id
    async fn insert_record(&mut self, name: &str) -> Result<i64, QueryError>;

    /// Release the connection
    async fn close(self: Box<Self>);
}
