//! # Status Pipeline
//!
//! Diagnostic walk through the request pipeline for health-check tooling.
//!
//! Stages run in order: identity token, secret fetch, translation, SQL login,
//! latest-record query. Each completed stage appends one step; the first
//! failure appends one error step and ends the run.

use super::{log_failure, RecordService};
use crate::connection_string::parse;
use crate::error::ServiceError;
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusStep {
    pub step: String,
    /// UTC, RFC 3339
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: PipelineStatus,
    pub steps: Vec<StatusStep>,
}

impl StatusReport {
    fn new() -> Self {
        Self {
            status: PipelineStatus::Ok,
            steps: Vec::new(),
        }
    }

    fn push(&mut self, step: impl Into<String>) {
        self.steps.push(StatusStep {
            step: step.into(),
            timestamp: Utc::now(),
        });
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == PipelineStatus::Ok
    }
}

impl RecordService {
    /// Run every pipeline stage once and report what happened
    ///
    /// Never fails: errors end up as the last step of an `error` report.
    pub async fn status(&self) -> StatusReport {
        metrics::increment_requests("status");
        let mut report = StatusReport::new();

        if let Err(e) = self.run_stages(&mut report).await {
            log_failure("status", &e);
            report.push(format!("ERROR: {e}"));
            report.status = PipelineStatus::Error;
        } else {
            info!(steps = report.steps.len(), "Status pipeline succeeded");
        }
        report
    }

    async fn run_stages(&self, report: &mut StatusReport) -> Result<(), ServiceError> {
        let token = self.resolver.acquire_token().await?;
        report.push(format!(
            "Managed identity token acquired (expires in {}s)",
            token.expires_in_secs
        ));

        let raw = self.resolver.get_secret(&self.secret_name).await?;
        report.push("Key Vault returned SQL connection string");

        let params = parse(&raw)?;
        drop(raw);
        report.push(format!("Connection string translated for {}", params.sanitized()));

        let mut conn = self.connect(&params).await?;
        report.push("SQL login successful");

        let latest = conn.latest_record().await;
        conn.close().await;
        match latest? {
            Some(record) => report.push(format!(
                "SQL OK, latest record: {} - {}",
                record.id, record.name
            )),
            None => report.push("SQL OK, no records found"),
        }
        Ok(())
    }
}
