//! Record service tests against in-memory collaborators
//!
//! Cover validation before I/O, add-then-list ordering, connect timeouts and
//! connection release, and the error taxonomy seen by callers.

mod common;

use common::{connection_string, service, ConnectMode, FakeResolver, MemoryConnector, PASSWORD};
use std::sync::Arc;
use vault_records::connection_string::{Field, TranslationError};
use vault_records::error::{
    ConnectFailure, ConnectionErrorKind, SecretError, ServiceError, ValidationError,
};

fn fixtures() -> (Arc<FakeResolver>, Arc<MemoryConnector>) {
    (
        Arc::new(FakeResolver::with_secret(connection_string())),
        Arc::new(MemoryConnector::new()),
    )
}

#[tokio::test]
async fn test_blank_names_are_rejected_before_any_io() {
    let (resolver, connector) = fixtures();
    let service = service(&resolver, &connector);

    for name in [None, Some(""), Some("   "), Some("\t\n")] {
        let err = service.add_record(name).await.unwrap_err();
        assert_eq!(err, ServiceError::Validation(ValidationError::EmptyName));
    }

    assert_eq!(resolver.secret_calls(), 0);
    assert_eq!(connector.connect_calls(), 0);
    assert_eq!(connector.insert_calls(), 0);
}

#[tokio::test]
async fn test_add_then_list_returns_newest_first() {
    let (resolver, connector) = fixtures();
    let service = service(&resolver, &connector);

    let first = service.add_record(Some("alice")).await.unwrap();
    let second = service.add_record(Some("bob")).await.unwrap();
    assert!(second > first);

    let records = service.list_records().await.unwrap();
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["bob", "alice"]);
    assert_eq!(records[0].id, second);
    assert!(records.windows(2).all(|w| w[0].id > w[1].id));
}

#[tokio::test]
async fn test_each_call_resolves_the_secret_and_releases_the_connection() {
    let (resolver, connector) = fixtures();
    connector.seed(&["one", "two"]);
    let service = service(&resolver, &connector);

    service.list_records().await.unwrap();
    service.add_record(Some("three")).await.unwrap();
    let latest = service.latest_record().await.unwrap().unwrap();

    assert_eq!(latest.name, "three");
    assert_eq!(resolver.secret_calls(), 3);
    assert_eq!(connector.connect_calls(), 3);
    assert_eq!(connector.open_connections(), 0);
}

#[tokio::test]
async fn test_connector_receives_translated_target() {
    let (resolver, connector) = fixtures();
    let service = service(&resolver, &connector);

    service.list_records().await.unwrap();

    let target = connector.last_target().unwrap();
    assert_eq!(
        target.as_tuple(),
        ("demo-sql.database.windows.net", "appuser", PASSWORD, "demo")
    );
    assert_eq!(target.port, 1433);
    assert!(target.encrypt);
    assert!(!target.trust_server_certificate);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_connect_times_out_within_bound() {
    let resolver = Arc::new(FakeResolver::with_secret(connection_string()));
    let connector = Arc::new(MemoryConnector::with_mode(ConnectMode::Hang));
    let service = service(&resolver, &connector);

    let start = tokio::time::Instant::now();
    let err = service.list_records().await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(elapsed >= common::CONNECT_TIMEOUT);
    assert!(elapsed < common::CONNECT_TIMEOUT + std::time::Duration::from_secs(1));

    let ServiceError::Connection(conn) = &err else {
        panic!("expected connection error, got {err:?}");
    };
    assert_eq!(conn.kind, ConnectionErrorKind::Timeout);
    assert_eq!(conn.target.server, "demo-sql.database.windows.net");
    assert_eq!(connector.open_connections(), 0);
}

#[tokio::test]
async fn test_auth_failure_is_sanitized() {
    let resolver = Arc::new(FakeResolver::with_secret(connection_string()));
    let connector = Arc::new(MemoryConnector::with_mode(ConnectMode::Fail(
        ConnectFailure::new(
            ConnectionErrorKind::AuthFailed,
            "Login failed for user 'appuser'.",
        ),
    )));
    let service = service(&resolver, &connector);

    let err = service.add_record(Some("alice")).await.unwrap_err();
    let message = err.to_string();

    assert!(matches!(
        &err,
        ServiceError::Connection(conn) if conn.kind == ConnectionErrorKind::AuthFailed
    ));
    assert!(message.contains("authFailed"));
    assert!(message.contains("database=demo"));
    assert!(!message.contains(PASSWORD));
    assert!(!format!("{err:?}").contains(PASSWORD));
    assert_eq!(connector.insert_calls(), 0);
}

#[tokio::test]
async fn test_secret_failure_skips_connect() {
    let resolver = Arc::new(FakeResolver::failing(SecretError::NotFound(
        "sql-conn-string".to_string(),
    )));
    let connector = Arc::new(MemoryConnector::new());
    let service = service(&resolver, &connector);

    let err = service.list_records().await.unwrap_err();
    assert_eq!(err.kind(), "secret");
    assert_eq!(connector.connect_calls(), 0);
}

#[tokio::test]
async fn test_incomplete_secret_reports_missing_fields() {
    let resolver = Arc::new(FakeResolver::with_secret(
        "Server=tcp:demo-sql.database.windows.net;Database=demo",
    ));
    let connector = Arc::new(MemoryConnector::new());
    let service = service(&resolver, &connector);

    let err = service.list_records().await.unwrap_err();
    assert_eq!(
        err,
        ServiceError::Translation(TranslationError::MissingFields(vec![
            Field::Username,
            Field::Password
        ]))
    );
    assert_eq!(connector.connect_calls(), 0);
}

#[tokio::test]
async fn test_query_failure_still_closes_connection() {
    let resolver = Arc::new(FakeResolver::with_secret(connection_string()));
    let connector = Arc::new(MemoryConnector::failing_queries());
    let service = service(&resolver, &connector);

    let err = service.add_record(Some("alice")).await.unwrap_err();
    assert_eq!(err.kind(), "query");
    assert!(err.to_string().contains("Invalid object name"));
    assert_eq!(connector.open_connections(), 0);
}

#[tokio::test]
async fn test_concurrent_requests_do_not_share_connections() {
    let (resolver, connector) = fixtures();
    let service = service(&resolver, &connector);

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..10 {
        let service = service.clone();
        tasks.spawn(async move {
            let name = format!("user-{i}");
            service.add_record(Some(&name)).await
        });
    }

    let mut ids = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        ids.push(joined.unwrap().unwrap());
    }
    ids.sort_unstable();
    ids.dedup();

    assert_eq!(ids.len(), 10);
    assert_eq!(connector.connect_calls(), 10);
    assert_eq!(connector.open_connections(), 0);
    assert_eq!(service.list_records().await.unwrap().len(), 10);
}
