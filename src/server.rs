//! # HTTP Server
//!
//! Record pages plus the operational endpoints.
//!
//! Provides endpoints:
//! - `/` - HTML page listing all records with an add form
//! - `/add` - Form POST that inserts one record
//! - `/status` - JSON walk through the secret → SQL pipeline
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always returns 200)
//! - `/readyz` - Readiness probe (returns 200 once the service is wired up)
//!
//! The server listens on port 8000 by default (configurable via `PORT`).

use crate::error::ServiceError;
use crate::observability::metrics::REGISTRY;
use crate::service::{RecordService, StatusReport};
use crate::storage::Record;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use minijinja::{context, Environment};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// HTML templates, compiled into the binary
///
/// Template names end in `.html`, so every interpolated value is escaped.
#[derive(Debug)]
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    /// Load the page templates
    ///
    /// # Errors
    ///
    /// Returns a template syntax error.
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("base.html", include_str!("../templates/base.html"))?;
        env.add_template("index.html", include_str!("../templates/index.html"))?;
        env.add_template("added.html", include_str!("../templates/added.html"))?;
        env.add_template("error.html", include_str!("../templates/error.html"))?;
        Ok(Self { env })
    }

    /// Render a named template with a serde-serializable context
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown template or a render failure.
    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(ctx)
    }
}

#[derive(Debug)]
pub struct ServerState {
    pub service: RecordService,
    pub templates: Templates,
    pub is_ready: Arc<AtomicBool>,
}

impl ServerState {
    #[must_use]
    pub fn new(service: RecordService, templates: Templates) -> Self {
        Self {
            service,
            templates,
            is_ready: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Router with all endpoints; shared by `start_server` and the route tests
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/add", post(add_handler))
        .route("/status", get(status_handler))
        .route("/live/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C or SIGTERM
///
/// # Errors
///
/// Fails if the port cannot be bound or the server stops with an I/O error.
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<(), anyhow::Error> {
    let app = router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received, draining connections");
}

/// HTTP status for each failure class
#[must_use]
pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::Secret(_) => StatusCode::BAD_GATEWAY,
        ServiceError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Translation(_) | ServiceError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Serialize)]
struct RecordView {
    id: i64,
    name: String,
    created_at: String,
}

impl From<Record> for RecordView {
    fn from(record: Record) -> Self {
        Self {
            id: record.id,
            name: record.name,
            created_at: record.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddForm {
    name: Option<String>,
}

fn page(state: &ServerState, status: StatusCode, name: &str, ctx: minijinja::Value) -> Response {
    match state.templates.render(name, ctx) {
        Ok(body) => (status, Html(body)).into_response(),
        Err(e) => {
            error!(template = name, "Failed to render template: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
        }
    }
}

fn error_page(state: &ServerState, err: &ServiceError) -> Response {
    page(
        state,
        status_for(err),
        "error.html",
        context! { kind => err.kind(), message => err.to_string() },
    )
}

async fn index_handler(State(state): State<Arc<ServerState>>) -> Response {
    match state.service.list_records().await {
        Ok(records) => {
            let records: Vec<RecordView> = records.into_iter().map(RecordView::from).collect();
            page(&state, StatusCode::OK, "index.html", context! { records })
        }
        Err(e) => error_page(&state, &e),
    }
}

async fn add_handler(State(state): State<Arc<ServerState>>, Form(form): Form<AddForm>) -> Response {
    match state.service.add_record(form.name.as_deref()).await {
        Ok(id) => page(&state, StatusCode::OK, "added.html", context! { id }),
        Err(e) => error_page(&state, &e),
    }
}

async fn status_handler(State(state): State<Arc<ServerState>>) -> Json<StatusReport> {
    Json(state.service.status().await)
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
