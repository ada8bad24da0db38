//! # StaffSync Engine
//!
//! Job manager and batch sync engine for StaffSync.
//!
//! This crate provides:
//! - The sync job state machine (pending → running → completed/failed/cancelled)
//! - Paginated extraction with per-batch progress checkpoints
//! - Per-record validation and idempotent upsert mapping
//! - A per-job log trail
//! - Collaborator seams for backup, audit and notification
//! - A daily scheduler
//!
//! ## Architecture
//!
//! A run is driven by the [`JobManager`]:
//! 1. Validate the [`RunConfiguration`] and claim the single run slot
//! 2. Create the job and move it to RUNNING
//! 3. Take a backup if requested
//! 4. Sync employees, then employments, inside one destination transaction
//! 5. Commit and complete, or roll back and fail
//!
//! ## Key Invariants
//!
//! - `processed == success + failed` on every job
//! - A bad record never stops the records after it
//! - A systemic failure leaves the destination unchanged
//! - Terminal jobs are never modified
//! - At most one run per manager

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collaborators;
mod config;
mod engine;
mod error;
mod job;
mod job_store;
mod log;
mod manager;
mod mapper;
mod persist;
mod progress;
mod scheduler;
mod validate;

pub use collaborators::{
    AuditEntry, AuditRecorder, BackupReceipt, BackupService, CollaboratorError,
    CollaboratorResult, Notifier, NullBackup, TracingAuditRecorder, TracingNotifier,
    ACTION_CANCEL_SYNC, RESOURCE_SYNC_JOB,
};
pub use config::{
    ManagerConfig, RunConfiguration, ScheduleConfig, BACKUP_TAG, DEFAULT_BATCH_SIZE,
    ENV_AUTO_BACKUP_BEFORE_SYNC, ENV_SCHEDULED_SYNC_ENABLED, ENV_SYNC_PAGE_SIZE,
    ENV_SYNC_SCHEDULE_TIME, ENV_SYNC_SCHEDULE_UTC_OFFSET, MAX_BATCH_SIZE, MIN_BATCH_SIZE,
};
pub use engine::{RunObserver, RunOutcome, SyncEngine};
pub use error::{RecordError, SyncError, SyncResult, ValidationError};
pub use job::{
    Counters, JobId, JobKind, JobStatus, NewJob, ServiceStatus, SyncJob, SyncReport,
};
pub use job_store::{JobStore, MemoryJobStore};
pub use log::{LogId, LogLevel, LogSink, MemoryLogSink, NewLogEntry, SyncLogEntry};
pub use manager::{
    JobManager, JobManagerBuilder, DEFAULT_JOB_PAGE, DEFAULT_LOG_PAGE, MANUAL_JOB_NAME,
    SCHEDULED_JOB_NAME, SYSTEM_INITIATOR,
};
pub use mapper::{
    map_employee, map_employment, CREATED_AT_COLUMN, EMPLOYEE_COLUMNS, EMPLOYMENT_COLUMNS,
};
pub use persist::{JsonJobStore, JsonLogSink};
pub use progress::{batch_windows, BatchWindow, ProgressTracker};
pub use scheduler::{next_run_after, run_daily};
pub use validate::{validate_employee, validate_employment};
