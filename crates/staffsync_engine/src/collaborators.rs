//! Services the job manager consults but does not own.

use crate::job::{JobId, SyncReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Error raised by a collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{service}: {message}")]
pub struct CollaboratorError {
    /// Which collaborator failed.
    pub service: &'static str,
    /// What went wrong.
    pub message: String,
}

impl CollaboratorError {
    /// Creates an error for the named collaborator.
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
        }
    }
}

/// Result type for collaborator calls.
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Proof of a completed backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupReceipt {
    /// Identifier of the backup (a file name, an object key).
    pub id: String,
    /// Completion time.
    pub created_at: DateTime<Utc>,
}

/// Takes a destination backup before a run.
pub trait BackupService: Send + Sync {
    /// Creates a backup labelled `tag` on behalf of `initiator`.
    ///
    /// # Errors
    ///
    /// An error fails the run before any destination write.
    fn create_backup(&self, tag: &str, initiator: &str) -> CollaboratorResult<BackupReceipt>;
}

/// An audited action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Who performed the action.
    pub user_id: String,
    /// Action name, e.g. `CANCEL_SYNC`.
    pub action: String,
    /// Type of the affected resource.
    pub resource_type: String,
    /// Id of the affected resource.
    pub resource_id: String,
    /// Extra detail.
    pub metadata: serde_json::Value,
}

/// Action name recorded when a job is cancelled.
pub const ACTION_CANCEL_SYNC: &str = "CANCEL_SYNC";

/// Resource type of sync jobs in the audit log.
pub const RESOURCE_SYNC_JOB: &str = "sync_job";

impl AuditEntry {
    /// Builds the entry for a cancelled job.
    pub fn cancel_sync(user_id: &str, job_id: JobId) -> Self {
        Self {
            user_id: user_id.to_string(),
            action: ACTION_CANCEL_SYNC.to_string(),
            resource_type: RESOURCE_SYNC_JOB.to_string(),
            resource_id: job_id.to_string(),
            metadata: serde_json::json!({ "jobId": job_id }),
        }
    }
}

/// Records audited actions.
pub trait AuditRecorder: Send + Sync {
    /// Records one action.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry could not be stored.
    fn record_action(&self, entry: AuditEntry) -> CollaboratorResult<()>;
}

/// Delivers notifications about scheduled runs.
pub trait Notifier: Send + Sync {
    /// A scheduled run completed.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery failed.
    fn notify_sync_completed(&self, report: &SyncReport) -> CollaboratorResult<()>;

    /// A scheduled run failed. `job_id` is absent when no job was created.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery failed.
    fn notify_sync_failed(&self, job_id: Option<JobId>, message: &str) -> CollaboratorResult<()>;
}

/// Backup service that takes no backup.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackup;

impl BackupService for NullBackup {
    fn create_backup(&self, tag: &str, initiator: &str) -> CollaboratorResult<BackupReceipt> {
        warn!(tag, initiator, "No backup service configured, skipping backup");
        Ok(BackupReceipt {
            id: format!("none-{tag}"),
            created_at: Utc::now(),
        })
    }
}

/// Audit recorder that writes to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditRecorder;

impl AuditRecorder for TracingAuditRecorder {
    fn record_action(&self, entry: AuditEntry) -> CollaboratorResult<()> {
        info!(
            user_id = %entry.user_id,
            action = %entry.action,
            resource_type = %entry.resource_type,
            resource_id = %entry.resource_id,
            "Audit"
        );
        Ok(())
    }
}

/// Notifier that writes to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify_sync_completed(&self, report: &SyncReport) -> CollaboratorResult<()> {
        info!(
            job_id = report.job_id,
            processed = report.records_processed,
            failed = report.records_failed,
            "Scheduled sync completed"
        );
        Ok(())
    }

    fn notify_sync_failed(&self, job_id: Option<JobId>, message: &str) -> CollaboratorResult<()> {
        warn!(?job_id, message, "Scheduled sync failed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_audit_entry() {
        let entry = AuditEntry::cancel_sync("u7", 42);
        assert_eq!(entry.action, "CANCEL_SYNC");
        assert_eq!(entry.resource_type, "sync_job");
        assert_eq!(entry.resource_id, "42");
        assert_eq!(entry.metadata["jobId"], 42);
    }

    #[test]
    fn null_backup_succeeds() {
        let receipt = NullBackup.create_backup("auto_pre_sync", "system").unwrap();
        assert_eq!(receipt.id, "none-auto_pre_sync");
    }

    #[test]
    fn error_display_names_the_service() {
        let err = CollaboratorError::new("backup", "disk full");
        assert_eq!(err.to_string(), "backup: disk full");
    }
}
