//! # Record Service
//!
//! Request-scoped record operations.
//!
//! Every call runs the full pipeline on its own:
//! resolve secret → translate → connect (bounded) → execute → close.
//! Nothing is cached between calls; the service only holds its collaborators.

pub mod status;

use crate::connection_string::{parse, ConnectionParameters, TdsTarget};
use crate::error::{ConnectionError, ConnectionErrorKind, ServiceError, ValidationError};
use crate::observability::metrics;
use crate::provider::SecretResolver;
use crate::storage::{Connector, Record, RecordConnection};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub use status::{PipelineStatus, StatusReport, StatusStep};

/// Record operations over a secret resolver and a SQL connector
#[derive(Clone)]
pub struct RecordService {
    resolver: Arc<dyn SecretResolver>,
    connector: Arc<dyn Connector>,
    secret_name: String,
    connect_timeout: Duration,
}

impl std::fmt::Debug for RecordService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordService")
            .field("secret_name", &self.secret_name)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl RecordService {
    #[must_use]
    pub fn new(
        resolver: Arc<dyn SecretResolver>,
        connector: Arc<dyn Connector>,
        secret_name: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            connector,
            secret_name: secret_name.into(),
            connect_timeout,
        }
    }

    /// All records, newest first
    ///
    /// # Errors
    ///
    /// Any pipeline stage failure, see [`ServiceError`].
    pub async fn list_records(&self) -> Result<Vec<Record>, ServiceError> {
        metrics::increment_requests("list");
        let result: Result<Vec<Record>, ServiceError> = async {
            let mut conn = self.open().await?;
            let records = conn.fetch_records().await;
            conn.close().await;
            Ok(records?)
        }
        .await;

        match &result {
            Ok(records) => debug!(count = records.len(), "Listed records"),
            Err(e) => log_failure("list", e),
        }
        result
    }

    /// Insert a record and return its id
    ///
    /// A missing or blank `name` is rejected before any secret or SQL call.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] for a blank name, otherwise any pipeline
    /// stage failure.
    pub async fn add_record(&self, name: Option<&str>) -> Result<i64, ServiceError> {
        metrics::increment_requests("add");
        let result: Result<i64, ServiceError> = async {
            let name = validate_name(name)?;
            let mut conn = self.open().await?;
            let id = conn.insert_record(name).await;
            conn.close().await;
            Ok(id?)
        }
        .await;

        match &result {
            Ok(id) => {
                metrics::increment_records_added();
                info!(record.id = id, "Added record");
            }
            Err(e) => log_failure("add", e),
        }
        result
    }

    /// The record with the highest id, if any
    ///
    /// # Errors
    ///
    /// Any pipeline stage failure, see [`ServiceError`].
    pub async fn latest_record(&self) -> Result<Option<Record>, ServiceError> {
        metrics::increment_requests("latest");
        let result: Result<Option<Record>, ServiceError> = async {
            let mut conn = self.open().await?;
            let record = conn.latest_record().await;
            conn.close().await;
            Ok(record?)
        }
        .await;

        if let Err(e) = &result {
            log_failure("latest", e);
        }
        result
    }

    async fn open(&self) -> Result<Box<dyn RecordConnection>, ServiceError> {
        let params = self.resolve_parameters().await?;
        self.connect(&params).await
    }

    /// Fetch the connection string and parse it
    async fn resolve_parameters(&self) -> Result<ConnectionParameters, ServiceError> {
        let raw = self.resolver.get_secret(&self.secret_name).await?;
        Ok(parse(&raw)?)
    }

    /// Open a connection, giving up after the configured timeout
    ///
    /// On expiry the connect future is dropped, which closes any socket it
    /// had opened.
    async fn connect(
        &self,
        params: &ConnectionParameters,
    ) -> Result<Box<dyn RecordConnection>, ServiceError> {
        let target = TdsTarget::from(params);
        let start = Instant::now();

        let outcome =
            tokio::time::timeout(self.connect_timeout, self.connector.connect(&target)).await;
        let (kind, cause) = match outcome {
            Ok(Ok(conn)) => {
                metrics::observe_sql_connect_duration(start.elapsed().as_secs_f64());
                debug!(sql.target = %params.sanitized(), "SQL connection opened");
                return Ok(conn);
            }
            Ok(Err(failure)) => (failure.kind, failure.cause),
            Err(_) => (
                ConnectionErrorKind::Timeout,
                format!(
                    "no connection within {}s",
                    self.connect_timeout.as_secs_f64()
                ),
            ),
        };

        metrics::increment_sql_connect_errors(kind.as_str());
        Err(ConnectionError {
            kind,
            cause,
            target: params.sanitized(),
        }
        .into())
    }
}

fn validate_name(name: Option<&str>) -> Result<&str, ValidationError> {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(ValidationError::EmptyName),
    }
}

fn log_failure(operation: &str, err: &ServiceError) {
    metrics::increment_request_errors(operation, err.kind());
    if err.is_client_error() {
        warn!(operation, error.kind = err.kind(), "Rejected request: {}", err);
    } else {
        error!(operation, error.kind = err.kind(), "Operation failed: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name(Some("  alice ")), Ok("alice"));
        assert_eq!(validate_name(None), Err(ValidationError::EmptyName));
        assert_eq!(validate_name(Some("")), Err(ValidationError::EmptyName));
        assert_eq!(validate_name(Some(" \t\n")), Err(ValidationError::EmptyName));
    }
}
