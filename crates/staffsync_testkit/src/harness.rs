//! A fully wired job manager for integration tests.

use crate::fixtures::relaxed_config;
use crate::recorders::{RecordingAudit, RecordingBackup, RecordingNotifier};
use staffsync_engine::{
    JobManager, JobManagerBuilder, JobStatus, LogLevel, LogSink, ManagerConfig, MemoryJobStore,
    MemoryLogSink, SyncJob, SyncLogEntry,
};
use staffsync_store::{DestinationStore, MemoryDestinationStore, SourceStore};
use std::sync::Arc;

/// A job manager over in-memory stores and recording collaborators.
///
/// Every part stays reachable, so tests can inspect what the manager did.
pub struct SyncHarness {
    /// Destination the manager writes to.
    pub destination: Arc<dyn DestinationStore>,
    /// Job store.
    pub jobs: Arc<MemoryJobStore>,
    /// Log sink.
    pub logs: Arc<MemoryLogSink>,
    /// Backup recorder.
    pub backup: Arc<RecordingBackup>,
    /// Audit recorder.
    pub audit: Arc<RecordingAudit>,
    /// Notification recorder.
    pub notifier: Arc<RecordingNotifier>,
    /// The manager under test.
    pub manager: Arc<JobManager>,
}

impl SyncHarness {
    /// Wires a manager over `source`, an empty in-memory destination and
    /// [`relaxed_config`].
    pub fn new(source: Arc<dyn SourceStore>) -> Self {
        Self::build(source, Arc::new(MemoryDestinationStore::new()), relaxed_config(), |b| b)
    }

    /// Wires a manager over the given stores and configuration.
    ///
    /// `customize` may replace any default before the manager is built.
    pub fn build(
        source: Arc<dyn SourceStore>,
        destination: Arc<dyn DestinationStore>,
        config: ManagerConfig,
        customize: impl FnOnce(JobManagerBuilder) -> JobManagerBuilder,
    ) -> Self {
        let jobs = Arc::new(MemoryJobStore::new());
        let logs = Arc::new(MemoryLogSink::new());
        let backup = Arc::new(RecordingBackup::new());
        let audit = Arc::new(RecordingAudit::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let builder = JobManager::builder(source, Arc::clone(&destination))
            .with_job_store(jobs.clone())
            .with_log_sink(logs.clone())
            .with_backup(backup.clone())
            .with_audit(audit.clone())
            .with_notifier(notifier.clone())
            .with_config(config);

        Self {
            destination,
            jobs,
            logs,
            backup,
            audit,
            notifier,
            manager: Arc::new(customize(builder).build()),
        }
    }

    /// Number of destination rows.
    pub fn row_count(&self) -> u64 {
        self.destination.row_count().expect("Failed to count rows")
    }

    /// Every job, oldest first.
    pub fn all_jobs(&self) -> Vec<SyncJob> {
        self.jobs.jobs()
    }

    /// A job's log entries at the given level, oldest first.
    pub fn logs_at(&self, job_id: u64, level: LogLevel) -> Vec<SyncLogEntry> {
        let mut entries: Vec<_> = self
            .logs
            .list(job_id, usize::MAX, 0)
            .expect("Failed to list logs")
            .into_iter()
            .filter(|e| e.level == level)
            .collect();
        entries.reverse();
        entries
    }
}

/// Asserts the counter invariant and terminal-state consistency of a job.
pub fn assert_job_consistent(job: &SyncJob) {
    let c = job.counters;
    assert_eq!(
        c.processed(),
        c.success() + c.failed(),
        "job {} counters out of balance",
        job.id
    );
    match job.status {
        JobStatus::Pending => assert!(job.started_at.is_none()),
        JobStatus::Running => assert!(job.started_at.is_some() && job.completed_at.is_none()),
        _ => assert!(job.started_at.is_some() && job.completed_at.is_some()),
    }
}
