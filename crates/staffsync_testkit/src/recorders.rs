//! Collaborators that remember every call.

use chrono::Utc;
use parking_lot::Mutex;
use staffsync_engine::{
    AuditEntry, AuditRecorder, BackupReceipt, BackupService, CollaboratorResult, JobId, Notifier,
    SyncReport,
};

/// A backup call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupCall {
    /// Tag passed to the backup service.
    pub tag: String,
    /// Initiator passed to the backup service.
    pub initiator: String,
}

/// Backup service that records calls and always succeeds.
#[derive(Debug, Default)]
pub struct RecordingBackup {
    calls: Mutex<Vec<BackupCall>>,
}

impl RecordingBackup {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<BackupCall> {
        self.calls.lock().clone()
    }
}

impl BackupService for RecordingBackup {
    fn create_backup(&self, tag: &str, initiator: &str) -> CollaboratorResult<BackupReceipt> {
        let mut calls = self.calls.lock();
        calls.push(BackupCall {
            tag: tag.to_string(),
            initiator: initiator.to_string(),
        });
        Ok(BackupReceipt {
            id: format!("backup-{}", calls.len()),
            created_at: Utc::now(),
        })
    }
}

/// Audit recorder that keeps entries in memory.
#[derive(Debug, Default)]
pub struct RecordingAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAudit {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries recorded so far.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }
}

impl AuditRecorder for RecordingAudit {
    fn record_action(&self, entry: AuditEntry) -> CollaboratorResult<()> {
        self.entries.lock().push(entry);
        Ok(())
    }
}

/// A delivered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A scheduled run completed.
    Completed(SyncReport),
    /// A scheduled run failed.
    Failed {
        /// Job concerned, if one was created.
        job_id: Option<JobId>,
        /// Failure message.
        message: String,
    },
}

/// Notifier that keeps notifications in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications sent so far.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_sync_completed(&self, report: &SyncReport) -> CollaboratorResult<()> {
        self.sent.lock().push(Notification::Completed(report.clone()));
        Ok(())
    }

    fn notify_sync_failed(&self, job_id: Option<JobId>, message: &str) -> CollaboratorResult<()> {
        self.sent.lock().push(Notification::Failed {
            job_id,
            message: message.to_string(),
        });
        Ok(())
    }
}
