//! # SQL Server Storage
//!
//! [`Connector`] implementation over `tiberius` (TDS 7.3, rustls).
//!
//! Statements are fixed; the only caller-supplied value, the record name, is
//! always bound as `@P1`.

use super::{Connector, Record, RecordConnection};
use crate::connection_string::TdsTarget;
use crate::error::{ConnectFailure, ConnectionErrorKind, QueryError};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

/// How a statement reaches the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    /// Plain SQL batch through `simple_query`. Required for anything that
    /// changes `@@TRANCOUNT`; SQL Server rejects that inside an RPC (error 266).
    Batch,
    /// `sp_executesql` RPC through `query`, with `@P1..` bound
    Rpc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Statement {
    SelectAll,
    SelectLatest,
    Insert,
    Begin,
    Commit,
    Rollback,
}

impl Statement {
    const fn sql(self) -> &'static str {
        match self {
            Self::SelectAll => "SELECT Id, Name, CreatedAt FROM DemoRecords ORDER BY Id DESC",
            Self::SelectLatest => {
                "SELECT TOP 1 Id, Name, CreatedAt FROM DemoRecords ORDER BY Id DESC"
            }
            Self::Insert => "INSERT INTO DemoRecords (Name) OUTPUT INSERTED.Id VALUES (@P1)",
            Self::Begin => "BEGIN TRANSACTION",
            Self::Commit => "COMMIT TRANSACTION",
            Self::Rollback => "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION",
        }
    }

    const fn dispatch(self) -> Dispatch {
        match self {
            Self::Begin | Self::Commit | Self::Rollback => Dispatch::Batch,
            Self::SelectAll | Self::SelectLatest | Self::Insert => Dispatch::Rpc,
        }
    }
}

/// SQL Server login failure
const LOGIN_FAILED: u32 = 18456;

/// Opens a fresh TDS connection per call
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlConnector;

impl MssqlConnector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn encryption_level(target: &TdsTarget) -> EncryptionLevel {
    if target.encrypt {
        EncryptionLevel::Required
    } else {
        EncryptionLevel::Off
    }
}

fn tiberius_config(target: &TdsTarget, host: &str, port: u16) -> Config {
    let (_, username, password, database) = target.as_tuple();

    let mut config = Config::new();
    config.host(host);
    config.port(port);
    config.database(database);
    config.authentication(AuthMethod::sql_server(username, password));
    config.encryption(encryption_level(target));
    if target.trust_server_certificate {
        config.trust_cert();
    }
    config
}

async fn open(config: Config) -> Result<Client<Compat<TcpStream>>, tiberius::error::Error> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;
    Client::connect(config, tcp.compat_write()).await
}

fn classify(err: &tiberius::error::Error) -> ConnectFailure {
    match err {
        tiberius::error::Error::Server(token) => classify_server(token.code(), token.message()),
        other => ConnectFailure::new(ConnectionErrorKind::Refused, other.to_string()),
    }
}

fn classify_server(code: u32, message: &str) -> ConnectFailure {
    let kind = if code == LOGIN_FAILED {
        ConnectionErrorKind::AuthFailed
    } else {
        ConnectionErrorKind::Refused
    };
    ConnectFailure::new(kind, message)
}

#[async_trait]
impl Connector for MssqlConnector {
    #[tracing::instrument(skip_all, fields(server = %target.server, port = target.port, database = %target.database))]
    async fn connect(
        &self,
        target: &TdsTarget,
    ) -> Result<Box<dyn RecordConnection>, ConnectFailure> {
        debug!("connecting to SQL Server");

        let client = match open(tiberius_config(target, &target.server, target.port)).await {
            Ok(client) => client,
            // Azure SQL gateways may redirect to the node that hosts the database
            Err(tiberius::error::Error::Routing { host, port }) => {
                debug!(redirect.host = %host, redirect.port = port, "following SQL Server redirect");
                open(tiberius_config(target, &host, port))
                    .await
                    .map_err(|e| classify(&e))?
            }
            Err(e) => return Err(classify(&e)),
        };

        debug!("SQL Server login successful");
        Ok(Box::new(MssqlConnection { client }))
    }
}

struct MssqlConnection {
    client: Client<Compat<TcpStream>>,
}

/// `Id` may be declared INT or BIGINT
fn id_column(row: &Row) -> Result<i64, QueryError> {
    widen_id(row.try_get::<i32, _>(0), || row.try_get::<i64, _>(0))
}

fn widen_id(
    int: tiberius::Result<Option<i32>>,
    bigint: impl FnOnce() -> tiberius::Result<Option<i64>>,
) -> Result<i64, QueryError> {
    let id = match int {
        Ok(id) => id.map(i64::from),
        Err(_) => bigint().map_err(|e| QueryError::new(e.to_string()))?,
    };
    required(id, "Id")
}

/// `DemoRecords` columns are NOT NULL; a NULL means the table is not what we expect
fn required<T>(value: Option<T>, column: &str) -> Result<T, QueryError> {
    value.ok_or_else(|| QueryError::new(format!("DemoRecords.{column} is NULL")))
}

fn to_record(row: &Row) -> Result<Record, QueryError> {
    let id = id_column(row)?;
    let name: Option<&str> = row.try_get(1).map_err(|e| QueryError::new(e.to_string()))?;
    let name = required(name, "Name")?;
    let created_at: Option<NaiveDateTime> =
        row.try_get(2).map_err(|e| QueryError::new(e.to_string()))?;
    let created_at = required(created_at, "CreatedAt")?;

    Ok(Record {
        id,
        name: name.to_string(),
        created_at,
    })
}

fn query_error(err: &tiberius::error::Error) -> QueryError {
    match err {
        tiberius::error::Error::Server(token) => QueryError::new(token.message()),
        other => QueryError::new(other.to_string()),
    }
}

impl MssqlConnection {
    /// Run a transaction-control statement and drain its results
    async fn batch(&mut self, statement: Statement) -> Result<(), QueryError> {
        debug_assert_eq!(statement.dispatch(), Dispatch::Batch);
        self.client
            .simple_query(statement.sql())
            .await
            .map_err(|e| query_error(&e))?
            .into_results()
            .await
            .map_err(|e| query_error(&e))?;
        Ok(())
    }

    /// Runs inside an open transaction; commits only when the new id came back
    async fn insert_in_transaction(&mut self, name: &str) -> Result<i64, QueryError> {
        let row = self
            .client
            .query(Statement::Insert.sql(), &[&name])
            .await
            .map_err(|e| query_error(&e))?
            .into_row()
            .await
            .map_err(|e| query_error(&e))?
            .ok_or_else(|| QueryError::new("INSERT returned no id"))?;
        let id = id_column(&row)?;

        self.batch(Statement::Commit).await?;
        Ok(id)
    }
}

#[async_trait]
impl RecordConnection for MssqlConnection {
    async fn fetch_records(&mut self) -> Result<Vec<Record>, QueryError> {
        let rows = self
            .client
            .query(Statement::SelectAll.sql(), &[])
            .await
            .map_err(|e| query_error(&e))?
            .into_first_result()
            .await
            .map_err(|e| query_error(&e))?;
        debug!(row_count = rows.len(), "fetched records");
        rows.iter().map(to_record).collect()
    }

    async fn latest_record(&mut self) -> Result<Option<Record>, QueryError> {
        let row = self
            .client
            .query(Statement::SelectLatest.sql(), &[])
            .await
            .map_err(|e| query_error(&e))?
            .into_row()
            .await
            .map_err(|e| query_error(&e))?;
        row.as_ref().map(to_record).transpose()
    }

    async fn insert_record(&mut self, name: &str) -> Result<i64, QueryError> {
        self.batch(Statement::Begin).await?;

        match self.insert_in_transaction(name).await {
            Ok(id) => Ok(id),
            Err(e) => {
                if let Err(rollback) = self.batch(Statement::Rollback).await {
                    warn!(error = %rollback, "rollback after failed insert also failed");
                }
                Err(e)
            }
        }
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.client.close().await {
            debug!(error = %e, "error while closing SQL Server connection");
        }
    }
}
