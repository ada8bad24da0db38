//! Error types for the sync engine.

use crate::job::{JobId, JobStatus};
use staffsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the job manager and the engine.
///
/// Per-record problems are not represented here; they are [`RecordError`]s,
/// counted and logged by the engine without aborting the run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Store failure that aborts the run (connectivity, transaction).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The pre-sync backup failed.
    #[error("backup failed: {0}")]
    Backup(String),

    /// The run configuration is out of bounds or malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Illegal job state change.
    #[error("invalid transition of job {job_id} from {from} to {to}")]
    InvalidTransition {
        /// Job whose transition was rejected.
        job_id: JobId,
        /// Current status.
        from: JobStatus,
        /// Requested status.
        to: JobStatus,
    },

    /// Another run already occupies the engine.
    #[error("job {job_id:?} is already running")]
    AlreadyRunning {
        /// The active job, if it has been created yet.
        job_id: Option<JobId>,
    },

    /// No job with this id exists.
    #[error("sync job {0} not found")]
    JobNotFound(JobId),

    /// The run observed a cancellation request.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Returns true if the error was raised before any job state changed.
    pub fn is_control_plane(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidTransition { .. }
                | SyncError::AlreadyRunning { .. }
                | SyncError::JobNotFound(_)
        )
    }
}

/// A required field was missing from a source record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field} is required")]
pub struct ValidationError {
    /// Source column that failed the check.
    pub field: &'static str,
}

/// Failure of a single record. Counted and logged, never propagated.
#[derive(Error, Debug)]
pub enum RecordError {
    /// The record failed validation.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The destination rejected the write.
    #[error("{0}")]
    Write(StoreError),
}

impl RecordError {
    /// Returns the stage at which the record failed.
    pub fn stage(&self) -> &'static str {
        match self {
            RecordError::Validation(_) => "validation",
            RecordError::Write(_) => "write",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_plane_errors() {
        assert!(SyncError::InvalidConfig("batch size".into()).is_control_plane());
        assert!(SyncError::JobNotFound(3).is_control_plane());
        assert!(SyncError::AlreadyRunning { job_id: Some(1) }.is_control_plane());
        assert!(SyncError::InvalidTransition {
            job_id: 1,
            from: JobStatus::Completed,
            to: JobStatus::Cancelled,
        }
        .is_control_plane());

        assert!(!SyncError::Backup("disk full".into()).is_control_plane());
        assert!(!SyncError::Cancelled.is_control_plane());
        assert!(!SyncError::Store(StoreError::Unavailable("reset".into())).is_control_plane());
    }

    #[test]
    fn error_display() {
        let err = SyncError::InvalidTransition {
            job_id: 4,
            from: JobStatus::Completed,
            to: JobStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "invalid transition of job 4 from completed to cancelled"
        );

        let err = RecordError::from(ValidationError { field: "first_name" });
        assert_eq!(err.to_string(), "first_name is required");
        assert_eq!(err.stage(), "validation");
    }
}
