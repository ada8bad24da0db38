//! The job manager.
//!
//! The manager owns the job state machine. It creates jobs, drives the
//! engine, persists checkpoints and final states, and handles cancellation.
//! At most one run is active per manager.

use crate::collaborators::{
    AuditEntry, AuditRecorder, BackupService, Notifier, NullBackup, TracingAuditRecorder,
    TracingNotifier,
};
use crate::config::{ManagerConfig, RunConfiguration, BACKUP_TAG};
use crate::engine::{RunObserver, RunOutcome, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::job::{
    Counters, JobId, JobKind, JobStatus, NewJob, ServiceStatus, SyncJob, SyncReport,
};
use crate::job_store::{JobStore, MemoryJobStore};
use crate::log::{LogSink, MemoryLogSink, NewLogEntry, SyncLogEntry};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use staffsync_store::{DestinationStore, SourceStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Name of manually triggered jobs.
pub const MANUAL_JOB_NAME: &str = "Manual Sync";

/// Name of scheduled jobs.
pub const SCHEDULED_JOB_NAME: &str = "Daily Scheduled Sync";

/// Initiator recorded on scheduled jobs.
pub const SYSTEM_INITIATOR: &str = "system";

/// Default page size of [`JobManager::list_jobs`].
pub const DEFAULT_JOB_PAGE: usize = 50;

/// Default page size of [`JobManager::list_logs`].
pub const DEFAULT_LOG_PAGE: usize = 100;

struct ActiveRun {
    job_id: Option<JobId>,
    cancel: Arc<AtomicBool>,
}

/// Releases the single-flight slot when the run ends, however it ends.
struct ActiveGuard<'a> {
    slot: &'a Mutex<Option<ActiveRun>>,
    cancel: Arc<AtomicBool>,
}

impl ActiveGuard<'_> {
    fn bind(&self, job_id: JobId) {
        if let Some(run) = self.slot.lock().as_mut() {
            run.job_id = Some(job_id);
        }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

/// Persists checkpoints of one running job.
struct JobObserver<'a> {
    jobs: &'a dyn JobStore,
    state_lock: &'a Mutex<()>,
    job_id: JobId,
    cancel: &'a AtomicBool,
}

impl RunObserver for JobObserver<'_> {
    fn checkpoint(&self, counters: Counters) -> SyncResult<()> {
        let _state = self.state_lock.lock();
        let mut job = self
            .jobs
            .get(self.job_id)?
            .ok_or(SyncError::JobNotFound(self.job_id))?;
        if job.status == JobStatus::Cancelled {
            // Stored by another handle; the in-process flag may never be set.
            return Err(SyncError::Cancelled);
        }
        job.checkpoint(counters, Utc::now())?;
        self.jobs.save(&job)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Builder for [`JobManager`].
pub struct JobManagerBuilder {
    source: Arc<dyn SourceStore>,
    destination: Arc<dyn DestinationStore>,
    jobs: Arc<dyn JobStore>,
    logs: Arc<dyn LogSink>,
    backup: Arc<dyn BackupService>,
    audit: Arc<dyn AuditRecorder>,
    notifier: Arc<dyn Notifier>,
    config: ManagerConfig,
}

impl JobManagerBuilder {
    /// Sets the job store (default: in memory).
    pub fn with_job_store(mut self, jobs: Arc<dyn JobStore>) -> Self {
        self.jobs = jobs;
        self
    }

    /// Sets the log sink (default: in memory).
    pub fn with_log_sink(mut self, logs: Arc<dyn LogSink>) -> Self {
        self.logs = logs;
        self
    }

    /// Sets the backup service (default: none).
    pub fn with_backup(mut self, backup: Arc<dyn BackupService>) -> Self {
        self.backup = backup;
        self
    }

    /// Sets the audit recorder (default: tracing).
    pub fn with_audit(mut self, audit: Arc<dyn AuditRecorder>) -> Self {
        self.audit = audit;
        self
    }

    /// Sets the notifier (default: tracing).
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Sets the manager configuration.
    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the manager.
    pub fn build(self) -> JobManager {
        JobManager {
            source: self.source,
            destination: self.destination,
            jobs: self.jobs,
            logs: self.logs,
            backup: self.backup,
            audit: self.audit,
            notifier: self.notifier,
            config: self.config,
            state_lock: Mutex::new(()),
            active: Mutex::new(None),
        }
    }
}

/// Owns the sync job lifecycle.
///
/// # Example
///
/// ```rust
/// use staffsync_engine::{JobManager, JobStatus, RunConfiguration};
/// use staffsync_store::{MemoryDestinationStore, MemorySourceStore, SourceEmployee};
/// use std::sync::Arc;
///
/// let source = Arc::new(MemorySourceStore::new());
/// let mut employee = SourceEmployee::new(1, "E001");
/// employee.first_name = Some("Bat".into());
/// employee.last_name = Some("Dorj".into());
/// source.insert_employee(employee);
///
/// let manager = JobManager::builder(source, Arc::new(MemoryDestinationStore::new())).build();
/// let report = manager.trigger_sync(RunConfiguration::default(), "admin").unwrap();
/// assert!(report.success);
/// assert_eq!(report.status, JobStatus::Completed);
/// assert_eq!(report.records_success, 1);
/// ```
pub struct JobManager {
    source: Arc<dyn SourceStore>,
    destination: Arc<dyn DestinationStore>,
    jobs: Arc<dyn JobStore>,
    logs: Arc<dyn LogSink>,
    backup: Arc<dyn BackupService>,
    audit: Arc<dyn AuditRecorder>,
    notifier: Arc<dyn Notifier>,
    config: ManagerConfig,
    /// Serializes job-row read-modify-write between the run and cancel.
    state_lock: Mutex<()>,
    active: Mutex<Option<ActiveRun>>,
}

impl JobManager {
    /// Starts building a manager over the given stores.
    pub fn builder(
        source: Arc<dyn SourceStore>,
        destination: Arc<dyn DestinationStore>,
    ) -> JobManagerBuilder {
        JobManagerBuilder {
            source,
            destination,
            jobs: Arc::new(MemoryJobStore::new()),
            logs: Arc::new(MemoryLogSink::new()),
            backup: Arc::new(NullBackup),
            audit: Arc::new(TracingAuditRecorder),
            notifier: Arc::new(TracingNotifier),
            config: ManagerConfig::default(),
        }
    }

    /// Returns the manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Returns true while a run occupies the manager.
    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Runs a manual sync and waits for it to finish.
    ///
    /// # Errors
    ///
    /// See [`JobManager::trigger`].
    pub fn trigger_sync(
        &self,
        config: RunConfiguration,
        initiator: &str,
    ) -> SyncResult<SyncReport> {
        self.trigger(JobKind::Manual, MANUAL_JOB_NAME, config, initiator)
    }

    /// Creates a job and runs it to completion.
    ///
    /// Systemic failures of the run are reported through the returned
    /// report, not as an error.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidConfig`] if the configuration is out of bounds
    /// - [`SyncError::AlreadyRunning`] if another run is active
    ///
    /// In both cases no job is created. Failures of the job store itself are
    /// also returned as errors.
    #[instrument(skip_all, fields(kind = %kind, initiator = %initiator))]
    pub fn trigger(
        &self,
        kind: JobKind,
        name: &str,
        config: RunConfiguration,
        initiator: &str,
    ) -> SyncResult<SyncReport> {
        let started = Instant::now();
        config.validate(&self.config)?;
        let guard = self.claim()?;

        let mut job = self.jobs.insert(NewJob {
            name: name.to_string(),
            kind,
            initiator: initiator.to_string(),
            config,
        })?;
        guard.bind(job.id);

        {
            let _state = self.state_lock.lock();
            job.transition(JobStatus::Running, Utc::now())?;
            self.jobs.save(&job)?;
        }
        info!(job_id = job.id, "Sync job started");

        let result = self.execute(&job, &guard.cancel);
        self.finish(job.id, result, started)
    }

    fn claim(&self) -> SyncResult<ActiveGuard<'_>> {
        let mut slot = self.active.lock();
        if let Some(run) = slot.as_ref() {
            return Err(SyncError::AlreadyRunning { job_id: run.job_id });
        }
        let cancel = Arc::new(AtomicBool::new(false));
        *slot = Some(ActiveRun {
            job_id: None,
            cancel: Arc::clone(&cancel),
        });
        Ok(ActiveGuard {
            slot: &self.active,
            cancel,
        })
    }

    fn execute(&self, job: &SyncJob, cancel: &AtomicBool) -> SyncResult<RunOutcome> {
        self.logs.append(
            NewLogEntry::info(job.id, format!("{} started by {}", job.name, job.initiator))
                .with_metadata(serde_json::to_value(&job.config).unwrap_or_default()),
        )?;

        if job.config.backup_before_sync {
            let receipt = self
                .backup
                .create_backup(BACKUP_TAG, &job.initiator)
                .map_err(|e| SyncError::Backup(e.to_string()))?;
            self.logs.append(
                NewLogEntry::info(job.id, "Pre-sync backup created")
                    .with_metadata(json!({ "backup": receipt.id })),
            )?;
        }

        let observer = JobObserver {
            jobs: self.jobs.as_ref(),
            state_lock: &self.state_lock,
            job_id: job.id,
            cancel,
        };
        SyncEngine::new(
            self.source.as_ref(),
            self.destination.as_ref(),
            self.logs.as_ref(),
        )
        .run(job.id, &job.config, &observer)
    }

    fn finish(
        &self,
        job_id: JobId,
        result: SyncResult<RunOutcome>,
        started: Instant,
    ) -> SyncResult<SyncReport> {
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let _state = self.state_lock.lock();
        let mut job = self.jobs.get(job_id)?.ok_or(SyncError::JobNotFound(job_id))?;

        let report = match result {
            Ok(outcome) if job.status == JobStatus::Running => {
                let now = Utc::now();
                job.checkpoint(outcome.counters, now)?;
                job.transition(JobStatus::Completed, now)?;
                self.jobs.save(&job)?;
                self.append_quietly(NewLogEntry::info(
                    job_id,
                    format!(
                        "Sync completed: {} processed, {} succeeded, {} failed",
                        outcome.counters.processed(),
                        outcome.counters.success(),
                        outcome.counters.failed()
                    ),
                ));
                info!(job_id, failed = outcome.counters.failed(), "Sync job completed");
                Self::report(&job, outcome.counters, outcome.errors, duration_ms)
            }
            Ok(_) | Err(SyncError::Cancelled) if job.status == JobStatus::Cancelled => {
                warn!(job_id, "Sync job ended after cancellation");
                let errors = job.error_message.clone().into_iter().collect();
                Self::report(&job, job.counters, errors, duration_ms)
            }
            other => {
                let message = match other {
                    Err(e) => e.to_string(),
                    Ok(_) => format!("job left the running state as {}", job.status),
                };
                error!(job_id, error = %message, "Sync job failed");
                if job.status == JobStatus::Running {
                    job.error_message = Some(message.clone());
                    job.transition(JobStatus::Failed, Utc::now())?;
                    self.jobs.save(&job)?;
                }
                self.append_quietly(
                    NewLogEntry::error(job_id, format!("Sync failed: {message}"))
                        .with_metadata(json!({ "error": message })),
                );
                Self::report(&job, Counters::default(), vec![message], duration_ms)
            }
        };
        Ok(report)
    }

    fn report(
        job: &SyncJob,
        counters: Counters,
        errors: Vec<String>,
        duration_ms: u64,
    ) -> SyncReport {
        SyncReport {
            job_id: job.id,
            status: job.status,
            success: job.status == JobStatus::Completed,
            records_processed: counters.processed(),
            records_success: counters.success(),
            records_failed: counters.failed(),
            errors,
            duration_ms,
        }
    }

    fn append_quietly(&self, entry: NewLogEntry) {
        if let Err(e) = self.logs.append(entry) {
            warn!(error = %e, "Could not append sync log entry");
        }
    }

    /// Lists jobs, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the job store cannot be read.
    pub fn list_jobs(&self, limit: usize, offset: usize) -> SyncResult<Vec<SyncJob>> {
        self.jobs.list(limit, offset)
    }

    /// Loads one job.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::JobNotFound`] for an unknown id.
    pub fn get_job(&self, job_id: JobId) -> SyncResult<SyncJob> {
        self.jobs.get(job_id)?.ok_or(SyncError::JobNotFound(job_id))
    }

    /// Lists a job's log entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::JobNotFound`] for an unknown id.
    pub fn list_logs(
        &self,
        job_id: JobId,
        limit: usize,
        offset: usize,
    ) -> SyncResult<Vec<SyncLogEntry>> {
        self.get_job(job_id)?;
        self.logs.list(job_id, limit, offset)
    }

    /// Cancels a running job.
    ///
    /// The job is marked CANCELLED immediately. The active run stops at its
    /// next batch boundary and rolls back.
    ///
    /// # Errors
    ///
    /// - [`SyncError::JobNotFound`] for an unknown id
    /// - [`SyncError::InvalidTransition`] if the job is not RUNNING
    #[instrument(skip(self))]
    pub fn cancel_job(&self, job_id: JobId, initiator: &str) -> SyncResult<SyncJob> {
        let job = {
            let _state = self.state_lock.lock();
            let mut job = self.get_job(job_id)?;
            job.transition(JobStatus::Cancelled, Utc::now())?;
            job.error_message = Some(format!("Cancelled by user: {initiator}"));
            self.jobs.save(&job)?;
            job
        };

        match self.active.lock().as_ref() {
            Some(run) if run.job_id == Some(job_id) => run.cancel.store(true, Ordering::SeqCst),
            _ => warn!(job_id, "No active run for cancelled job"),
        }

        if let Err(e) = self.audit.record_action(AuditEntry::cancel_sync(initiator, job_id)) {
            warn!(job_id, error = %e, "Could not record cancel audit entry");
        }
        self.append_quietly(NewLogEntry::warn(
            job_id,
            format!("Sync cancelled by user: {initiator}"),
        ));
        info!(job_id, initiator, "Sync job cancelled");
        Ok(job)
    }

    /// Summarises recent activity.
    ///
    /// # Errors
    ///
    /// Returns an error if the job store cannot be read.
    pub fn service_status(&self) -> SyncResult<ServiceStatus> {
        let recent = self.jobs.list(5, 0)?;
        let running_jobs = recent
            .iter()
            .filter(|job| job.status == JobStatus::Running)
            .count();
        let last_successful_sync = self
            .jobs
            .list(usize::MAX, 0)?
            .iter()
            .filter(|job| job.status == JobStatus::Completed)
            .filter_map(|job| job.completed_at)
            .max();

        Ok(ServiceStatus {
            is_healthy: true,
            running_jobs,
            last_successful_sync,
            recent_jobs: recent.into_iter().take(3).collect(),
        })
    }

    /// Runs the scheduled sync, if enabled, and notifies about the result.
    ///
    /// Returns `Ok(None)` when scheduled sync is disabled.
    ///
    /// # Errors
    ///
    /// Returns the error of [`JobManager::trigger`] after notifying it.
    pub fn run_scheduled_sync(&self) -> SyncResult<Option<SyncReport>> {
        if !self.config.scheduled_sync_enabled {
            info!("Scheduled sync is disabled");
            return Ok(None);
        }

        let config = self.config.scheduled_run_config();
        match self.trigger(JobKind::Scheduled, SCHEDULED_JOB_NAME, config, SYSTEM_INITIATOR) {
            Ok(report) => {
                let delivered = if report.success {
                    self.notifier.notify_sync_completed(&report)
                } else {
                    let message = if report.errors.is_empty() {
                        format!("sync job ended as {}", report.status)
                    } else {
                        report.errors.join("; ")
                    };
                    self.notifier.notify_sync_failed(Some(report.job_id), &message)
                };
                if let Err(e) = delivered {
                    warn!(job_id = report.job_id, error = %e, "Notification failed");
                }
                Ok(Some(report))
            }
            Err(e) => {
                if let Err(notify) = self.notifier.notify_sync_failed(None, &e.to_string()) {
                    warn!(error = %notify, "Notification failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use staffsync_store::{MemoryDestinationStore, MemorySourceStore, SourceEmployee};

    fn manager(n: i64) -> JobManager {
        let source = MemorySourceStore::new();
        for id in 1..=n {
            let mut e = SourceEmployee::new(id, format!("E{id:03}"));
            e.first_name = Some("Bat".into());
            e.last_name = Some("Dorj".into());
            source.insert_employee(e);
        }
        JobManager::builder(Arc::new(source), Arc::new(MemoryDestinationStore::new()))
            .with_config(ManagerConfig::default().with_batch_bounds(1, 2000))
            .build()
    }

    #[test]
    fn manual_sync_completes() {
        let manager = manager(3);
        let report = manager
            .trigger_sync(RunConfiguration::default().with_batch_size(2), "u1")
            .unwrap();

        assert!(report.success);
        assert_eq!(report.records_processed, 3);

        let job = manager.get_job(report.job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.name, MANUAL_JOB_NAME);
        assert_eq!(job.kind, JobKind::Manual);
        assert_eq!(job.counters.success(), 3);
        assert!(!manager.is_running());
    }

    #[test]
    fn out_of_range_batch_creates_no_job() {
        let manager = manager(1);
        let err = manager
            .trigger_sync(RunConfiguration::default().with_batch_size(5000), "u1")
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
        assert!(manager.list_jobs(DEFAULT_JOB_PAGE, 0).unwrap().is_empty());
    }

    #[test]
    fn cancel_requires_running() {
        let manager = manager(1);
        let report = manager.trigger_sync(RunConfiguration::default(), "u1").unwrap();
        let err = manager.cancel_job(report.job_id, "u2").unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidTransition { from: JobStatus::Completed, to: JobStatus::Cancelled, .. }
        ));
        assert!(matches!(manager.cancel_job(99, "u2"), Err(SyncError::JobNotFound(99))));
    }

    #[test]
    fn stored_cancellation_stops_the_run() {
        let source = MemorySourceStore::new();
        for id in 1..=3 {
            let mut e = SourceEmployee::new(id, format!("E{id:03}"));
            e.first_name = Some("Bat".into());
            e.last_name = Some("Dorj".into());
            source.insert_employee(e);
        }
        let destination = MemoryDestinationStore::new();
        let logs = MemoryLogSink::new();
        let jobs = MemoryJobStore::new();
        let config = RunConfiguration::default().with_batch_size(1);
        let mut job = jobs
            .insert(NewJob {
                name: "Manual Sync".into(),
                kind: JobKind::Manual,
                initiator: "u1".into(),
                config: config.clone(),
            })
            .unwrap();
        job.transition(JobStatus::Running, Utc::now()).unwrap();
        job.transition(JobStatus::Cancelled, Utc::now()).unwrap();
        jobs.save(&job).unwrap();

        let state_lock = Mutex::new(());
        let cancel = AtomicBool::new(false);
        let observer = JobObserver {
            jobs: &jobs,
            state_lock: &state_lock,
            job_id: job.id,
            cancel: &cancel,
        };
        assert!(matches!(
            observer.checkpoint(Counters::default()),
            Err(SyncError::Cancelled)
        ));

        let err = SyncEngine::new(&source, &destination, &logs)
            .run(job.id, &config, &observer)
            .unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert_eq!(destination.row_count().unwrap(), 0);
        assert_eq!(jobs.get(job.id).unwrap().unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn unknown_job_logs() {
        let manager = manager(1);
        assert!(matches!(manager.list_logs(1, 10, 0), Err(SyncError::JobNotFound(1))));
    }

    #[test]
    fn status_reports_last_success() {
        let manager = manager(1);
        let empty = manager.service_status().unwrap();
        assert!(empty.is_healthy);
        assert!(empty.last_successful_sync.is_none());

        for _ in 0..4 {
            manager.trigger_sync(RunConfiguration::default(), "u1").unwrap();
        }
        let status = manager.service_status().unwrap();
        assert_eq!(status.running_jobs, 0);
        assert_eq!(status.recent_jobs.len(), 3);
        assert_eq!(status.recent_jobs[0].id, 4);
        assert_eq!(
            status.last_successful_sync,
            manager.get_job(4).unwrap().completed_at
        );
    }

    #[test]
    fn disabled_schedule_does_nothing() {
        let source = MemorySourceStore::new();
        let manager = JobManager::builder(Arc::new(source), Arc::new(MemoryDestinationStore::new()))
            .with_config(ManagerConfig::default().with_scheduled_sync(false))
            .build();
        assert!(manager.run_scheduled_sync().unwrap().is_none());
        assert!(manager.list_jobs(10, 0).unwrap().is_empty());
    }
}
