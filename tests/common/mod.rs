//! Common test utilities
//!
//! Provides rustls setup plus in-memory stand-ins for the secret store and the
//! SQL engine, so the record service and routes run without Azure or SQL Server.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use std::future::pending;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use vault_records::connection_string::{RawConnectionString, TdsTarget};
use vault_records::error::{ConnectFailure, QueryError, SecretError};
use vault_records::provider::{SecretResolver, TokenInfo};
use vault_records::storage::{Connector, Record, RecordConnection};
use vault_records::RecordService;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once across all tests.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

pub const SECRET_NAME: &str = "sql-conn-string";
pub const PASSWORD: &str = "s3cr3t-P@ss";

pub fn connection_string() -> String {
    format!(
        "Server=tcp:demo-sql.database.windows.net,1433;Initial Catalog=demo;User ID=appuser;Password={PASSWORD};Encrypt=True;TrustServerCertificate=False;Connection Timeout=30;"
    )
}

/// Secret store double
pub struct FakeResolver {
    secret: Result<String, SecretError>,
    token: Result<TokenInfo, SecretError>,
    secret_calls: AtomicUsize,
}

impl FakeResolver {
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: Ok(secret.into()),
            token: Ok(TokenInfo {
                expires_in_secs: 3599,
            }),
            secret_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(err: SecretError) -> Self {
        Self {
            secret: Err(err),
            ..Self::with_secret("")
        }
    }

    pub fn token_denied(err: SecretError) -> Self {
        Self {
            token: Err(err),
            ..Self::with_secret(connection_string())
        }
    }

    pub fn secret_calls(&self) -> usize {
        self.secret_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretResolver for FakeResolver {
    async fn acquire_token(&self) -> Result<TokenInfo, SecretError> {
        self.token.clone()
    }

    async fn get_secret(&self, secret_name: &str) -> Result<RawConnectionString, SecretError> {
        assert_eq!(secret_name, SECRET_NAME);
        self.secret_calls.fetch_add(1, Ordering::SeqCst);
        self.secret.clone().map(RawConnectionString::from)
    }
}

/// How [`MemoryConnector::connect`] behaves
#[derive(Debug, Clone)]
pub enum ConnectMode {
    Accept,
    /// Never completes; only a timeout gets the caller out
    Hang,
    Fail(ConnectFailure),
}

/// Decrements the open-connection counter when dropped
struct OpenGuard(Arc<AtomicUsize>);

impl OpenGuard {
    fn new(open: &Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(open))
    }
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// SQL engine double backed by a `Vec<Record>`
pub struct MemoryConnector {
    mode: ConnectMode,
    rows: Arc<Mutex<Vec<Record>>>,
    open: Arc<AtomicUsize>,
    connects: AtomicUsize,
    inserts: Arc<AtomicUsize>,
    last_target: Mutex<Option<TdsTarget>>,
    fail_queries: bool,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::with_mode(ConnectMode::Accept)
    }

    pub fn with_mode(mode: ConnectMode) -> Self {
        Self {
            mode,
            rows: Arc::new(Mutex::new(Vec::new())),
            open: Arc::new(AtomicUsize::new(0)),
            connects: AtomicUsize::new(0),
            inserts: Arc::new(AtomicUsize::new(0)),
            last_target: Mutex::new(None),
            fail_queries: false,
        }
    }

    /// Connections succeed but every statement is rejected
    pub fn failing_queries() -> Self {
        Self {
            fail_queries: true,
            ..Self::new()
        }
    }

    pub fn seed(&self, names: &[&str]) {
        let mut rows = self.rows.lock().unwrap();
        for name in names {
            let id = i64::try_from(rows.len()).unwrap() + 1;
            rows.push(Record {
                id,
                name: (*name).to_string(),
                created_at: chrono::Utc::now().naive_utc(),
            });
        }
    }

    /// Connections currently open (including in-flight connect attempts)
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn last_target(&self) -> Option<TdsTarget> {
        self.last_target.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        target: &TdsTarget,
    ) -> Result<Box<dyn RecordConnection>, ConnectFailure> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_target.lock().unwrap() = Some(target.clone());
        let guard = OpenGuard::new(&self.open);

        match &self.mode {
            ConnectMode::Accept => Ok(Box::new(MemoryConnection {
                rows: Arc::clone(&self.rows),
                inserts: Arc::clone(&self.inserts),
                fail_queries: self.fail_queries,
                _guard: guard,
            })),
            ConnectMode::Hang => {
                pending::<()>().await;
                unreachable!()
            }
            ConnectMode::Fail(failure) => Err(failure.clone()),
        }
    }
}

struct MemoryConnection {
    rows: Arc<Mutex<Vec<Record>>>,
    inserts: Arc<AtomicUsize>,
    fail_queries: bool,
    _guard: OpenGuard,
}

impl MemoryConnection {
    fn check(&self) -> Result<(), QueryError> {
        if self.fail_queries {
            Err(QueryError::new("Invalid object name 'DemoRecords'."))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordConnection for MemoryConnection {
    async fn fetch_records(&mut self) -> Result<Vec<Record>, QueryError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap().clone();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(rows)
    }

    async fn latest_record(&mut self) -> Result<Option<Record>, QueryError> {
        self.check()?;
        Ok(self.rows.lock().unwrap().iter().max_by_key(|r| r.id).cloned())
    }

    async fn insert_record(&mut self, name: &str) -> Result<i64, QueryError> {
        self.check()?;
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().unwrap();
        let id = rows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        rows.push(Record {
            id,
            name: name.to_string(),
            created_at: chrono::Utc::now().naive_utc(),
        });
        Ok(id)
    }

    async fn close(self: Box<Self>) {}
}

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn service(resolver: &Arc<FakeResolver>, connector: &Arc<MemoryConnector>) -> RecordService {
    RecordService::new(
        Arc::clone(resolver) as Arc<dyn SecretResolver>,
        Arc::clone(connector) as Arc<dyn Connector>,
        SECRET_NAME,
        CONNECT_TIMEOUT,
    )
}
