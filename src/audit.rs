//! Audit trail
//!
//! Appends one JSON object per line for every routing decision and every
//! approval-request status change. Diagnostic only: a failed write is logged
//! and never blocks the pipeline.

use crate::approval::{ApprovalEvent, ApprovalStatus};
use crate::felt::Felt;
use crate::intent::Action;
use crate::router::AuthorizationPath;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Entry in the audit log
#[derive(Debug, Serialize)]
#[serde(tag = "entry_type", rename_all = "snake_case")]
enum AuditEntry<'a> {
    Route {
        timestamp: DateTime<Utc>,
        path: AuthorizationPath,
        action: Action,
        token: &'a str,
    },
    Transition {
        timestamp: DateTime<Utc>,
        request_id: &'a str,
        from: ApprovalStatus,
        to: ApprovalStatus,
        event: ApprovalEvent,
        #[serde(skip_serializing_if = "Option::is_none")]
        tx_hash: Option<Felt>,
    },
    SubmissionFailed {
        timestamp: DateTime<Utc>,
        request_id: &'a str,
        status: ApprovalStatus,
        error: &'a str,
    },
}

/// Writer for audit log entries
struct AuditLogWriter {
    path: PathBuf,
}

impl AuditLogWriter {
    fn write(&self, entry: &AuditEntry<'_>) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

pub struct AuditLog {
    writer: Mutex<AuditLogWriter>,
}

impl AuditLog {
    /// # Arguments
    /// * `log_path` - Path to the audit log file (JSONL format)
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Mutex::new(AuditLogWriter {
                path: log_path.into(),
            }),
        }
    }

    async fn append(&self, entry: AuditEntry<'_>) {
        let writer = self.writer.lock().await;
        if let Err(e) = writer.write(&entry) {
            tracing::warn!(error = %e, path = %writer.path.display(), "Failed to write audit log entry");
        }
    }

    pub async fn record_route(&self, path: AuthorizationPath, action: Action, token: &str) {
        self.append(AuditEntry::Route {
            timestamp: Utc::now(),
            path,
            action,
            token,
        })
        .await;
    }

    pub async fn record_transition(
        &self,
        request_id: &str,
        from: ApprovalStatus,
        to: ApprovalStatus,
        event: ApprovalEvent,
        tx_hash: Option<Felt>,
    ) {
        self.append(AuditEntry::Transition {
            timestamp: Utc::now(),
            request_id,
            from,
            to,
            event,
            tx_hash,
        })
        .await;
    }

    pub async fn record_submission_failure(
        &self,
        request_id: &str,
        status: ApprovalStatus,
        error: &str,
    ) {
        self.append(AuditEntry::SubmissionFailed {
            timestamp: Utc::now(),
            request_id,
            status,
            error,
        })
        .await;
    }
}
