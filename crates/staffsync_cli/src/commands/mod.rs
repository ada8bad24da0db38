//! CLI command implementations.

pub mod backup;
pub mod jobs;
pub mod run;
pub mod schedule;

use backup::SnapshotBackup;
use clap::ValueEnum;
use serde::Serialize;
use staffsync_engine::{JobManager, JsonJobStore, JsonLogSink, ManagerConfig, SyncJob};
use staffsync_store::{
    load_source_snapshot, DirLock, FileDestinationStore, MemorySourceStore, SourceStore,
};
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Output format of listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Layout of a data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Wraps a data directory path.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Source snapshot document.
    pub fn source(&self) -> PathBuf {
        self.root.join("source.json")
    }

    /// Destination table document.
    pub fn destination(&self) -> PathBuf {
        self.root.join("destination.json")
    }

    /// Job records document.
    pub fn jobs(&self) -> PathBuf {
        self.root.join("jobs.json")
    }

    /// Log entries, one JSON object per line.
    pub fn logs(&self) -> PathBuf {
        self.root.join("logs.jsonl")
    }

    /// Directory of pre-sync backups.
    pub fn backups(&self) -> PathBuf {
        self.root.join("backups")
    }

    /// Opens a job manager for commands that write, holding the directory
    /// lock until the returned session is dropped.
    ///
    /// Commands that never read the source pass `require_source = false` and
    /// get an empty source when `source.json` is absent.
    ///
    /// # Errors
    ///
    /// Fails at once if another process holds the lock.
    pub fn open_manager(&self, require_source: bool) -> Result<Session, Box<dyn std::error::Error>> {
        self.check_root()?;
        let lock = DirLock::acquire(&self.root)?;
        let manager = self.build_manager(require_source)?;
        Ok(Session {
            manager: Arc::new(manager),
            _lock: Some(lock),
        })
    }

    /// Opens a job manager for commands that only read.
    ///
    /// No lock is taken. Every document is replaced atomically, so readers
    /// see a consistent snapshot while a writer is running.
    pub fn open_reader(&self) -> Result<Session, Box<dyn std::error::Error>> {
        self.check_root()?;
        Ok(Session {
            manager: Arc::new(self.build_manager(false)?),
            _lock: None,
        })
    }

    fn check_root(&self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.root.is_dir() {
            return Err(format!("No data directory at {:?}", self.root).into());
        }
        Ok(())
    }

    fn build_manager(&self, require_source: bool) -> Result<JobManager, Box<dyn std::error::Error>> {
        let source_path = self.source();
        let source: Arc<dyn SourceStore> = if require_source || source_path.exists() {
            Arc::new(load_source_snapshot(&source_path)?)
        } else {
            Arc::new(MemorySourceStore::new())
        };
        let destination = Arc::new(FileDestinationStore::open(&self.destination())?);
        let config = ManagerConfig::from_env()?;
        debug!(root = %self.root.display(), ?config, "Opening job manager");

        Ok(JobManager::builder(source, destination.clone())
            .with_job_store(Arc::new(JsonJobStore::open(&self.jobs())?))
            .with_log_sink(Arc::new(JsonLogSink::open(&self.logs())?))
            .with_backup(Arc::new(SnapshotBackup::new(
                destination.path(),
                &self.backups(),
            )))
            .with_config(config)
            .build())
    }
}

/// A job manager over a data directory, with the directory lock if it
/// was opened for writing.
pub struct Session {
    manager: Arc<JobManager>,
    _lock: Option<DirLock>,
}

impl Session {
    /// Returns a shared handle to the manager. The session must outlive it.
    pub fn shared(&self) -> Arc<JobManager> {
        Arc::clone(&self.manager)
    }
}

impl Deref for Session {
    type Target = JobManager;

    fn deref(&self) -> &JobManager {
        &self.manager
    }
}

/// Prints a value as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints a one-line job summary.
pub fn print_job_line(job: &SyncJob) {
    println!(
        "{:>6}  {:<10} {:<9} {:>7} ok {:>7} failed  {}  by {}",
        job.id,
        job.status.as_str(),
        job.kind.as_str(),
        job.counters.success(),
        job.counters.failed(),
        job.created_at.format("%Y-%m-%d %H:%M:%S"),
        job.initiator,
    );
}

/// Prints every field of a job.
pub fn print_job_detail(job: &SyncJob) {
    println!("Job {}", job.id);
    println!("  Name: {}", job.name);
    println!("  Kind: {}", job.kind);
    println!("  Status: {}", job.status);
    println!("  Initiator: {}", job.initiator);
    println!("  Created: {}", job.created_at);
    if let Some(started) = job.started_at {
        println!("  Started: {}", started);
    }
    if let Some(completed) = job.completed_at {
        println!("  Completed: {}", completed);
    }
    if let Some(ms) = job.duration_ms() {
        println!("  Duration: {} ms", ms);
    }
    println!("  Processed: {}", job.counters.processed());
    println!("  Succeeded: {}", job.counters.success());
    println!("  Failed: {}", job.counters.failed());
    if let Some(message) = &job.error_message {
        println!("  Error: {}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use staffsync_engine::{JobStatus, RunConfiguration};
    use staffsync_store::{write_json_atomic, DestinationStore, SourceEmployee, SourceSnapshot};
    use staffsync_testkit::{populated_source, TestDataDir};
    use tempfile::tempdir;

    fn employee(id: i64) -> SourceEmployee {
        let mut e = SourceEmployee::new(id, format!("E{id:03}"));
        e.first_name = Some(format!("Bat{id}"));
        e.last_name = Some(format!("Dorj{id}"));
        e
    }

    #[test]
    fn manager_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let data_dir = DataDir::new(dir.path().to_path_buf());
        let snapshot = SourceSnapshot {
            employees: vec![employee(1), employee(2)],
            employments: vec![],
        };
        write_json_atomic(&data_dir.source(), &snapshot).unwrap();

        let report = data_dir
            .open_manager(true)
            .unwrap()
            .trigger_sync(RunConfiguration::default(), "tester")
            .unwrap();
        assert!(report.success);

        let reopened = data_dir.open_reader().unwrap();
        let job = reopened.get_job(report.job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.counters.success(), 2);
        assert!(!reopened.list_logs(job.id, 10, 0).unwrap().is_empty());

        let destination = FileDestinationStore::open(&data_dir.destination()).unwrap();
        assert_eq!(destination.row_count().unwrap(), 2);
        assert_eq!(std::fs::read_dir(data_dir.backups()).unwrap().count(), 1);
    }

    #[test]
    fn run_requires_a_source_snapshot() {
        let dir = tempdir().unwrap();
        let data_dir = DataDir::new(dir.path().to_path_buf());

        assert!(data_dir.open_manager(true).is_err());
        let manager = data_dir.open_manager(false).unwrap();
        assert!(manager.list_jobs(10, 0).unwrap().is_empty());
    }

    #[test]
    fn second_writer_on_the_same_directory_is_refused() {
        let data = TestDataDir::with_source(&populated_source(3).snapshot());
        let data_dir = DataDir::new(data.path().to_path_buf());

        let first = data_dir.open_manager(true).unwrap();
        let err = data_dir.open_manager(true).err().unwrap();
        assert!(err.to_string().contains("locked by another process"));

        // Readers are not blocked by the writer.
        assert!(data_dir.open_reader().unwrap().list_jobs(10, 0).unwrap().is_empty());

        let report = first
            .trigger_sync(RunConfiguration::default().with_backup(false), "tester")
            .unwrap();
        assert!(report.success);
        drop(first);

        let second = data_dir.open_manager(true).unwrap();
        let report = second
            .trigger_sync(RunConfiguration::default().with_backup(false), "tester")
            .unwrap();
        assert_eq!(report.job_id, 2);

        let jobs = second.list_jobs(10, 0).unwrap();
        assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), vec![2, 1]);
        let destination = FileDestinationStore::open(&data_dir.destination()).unwrap();
        assert_eq!(destination.row_count().unwrap(), 3);
    }
}
