//! Job persistence.

use crate::error::{SyncError, SyncResult};
use crate::job::{JobId, NewJob, SyncJob};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Storage for sync jobs.
pub trait JobStore: Send + Sync {
    /// Creates a PENDING job from `job` and returns it.
    ///
    /// # Errors
    ///
    /// Returns an error if the job cannot be stored.
    fn insert(&self, job: NewJob) -> SyncResult<SyncJob>;

    /// Loads a job.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, id: JobId) -> SyncResult<Option<SyncJob>>;

    /// Replaces a stored job.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::JobNotFound`] if the job was never inserted.
    fn save(&self, job: &SyncJob) -> SyncResult<()>;

    /// Lists jobs, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list(&self, limit: usize, offset: usize) -> SyncResult<Vec<SyncJob>>;
}

/// In-memory job store.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<BTreeMap<JobId, SyncJob>>,
}

impl MemoryJobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding previously saved jobs.
    pub fn with_jobs(jobs: impl IntoIterator<Item = SyncJob>) -> Self {
        Self {
            jobs: RwLock::new(jobs.into_iter().map(|job| (job.id, job)).collect()),
        }
    }

    /// Returns every job, oldest first.
    pub fn jobs(&self) -> Vec<SyncJob> {
        self.jobs.read().values().cloned().collect()
    }

    pub(crate) fn insert_with(
        &self,
        job: NewJob,
        persist: impl FnOnce(&BTreeMap<JobId, SyncJob>) -> SyncResult<()>,
    ) -> SyncResult<SyncJob> {
        let mut jobs = self.jobs.write();
        let id = jobs.keys().next_back().map_or(1, |last| last + 1);
        let job = job.into_job(id, Utc::now());
        let mut next = jobs.clone();
        next.insert(id, job.clone());
        persist(&next)?;
        *jobs = next;
        Ok(job)
    }

    pub(crate) fn save_with(
        &self,
        job: &SyncJob,
        persist: impl FnOnce(&BTreeMap<JobId, SyncJob>) -> SyncResult<()>,
    ) -> SyncResult<()> {
        let mut jobs = self.jobs.write();
        if !jobs.contains_key(&job.id) {
            return Err(SyncError::JobNotFound(job.id));
        }
        let mut next = jobs.clone();
        next.insert(job.id, job.clone());
        persist(&next)?;
        *jobs = next;
        Ok(())
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: NewJob) -> SyncResult<SyncJob> {
        self.insert_with(job, |_| Ok(()))
    }

    fn get(&self, id: JobId) -> SyncResult<Option<SyncJob>> {
        Ok(self.jobs.read().get(&id).cloned())
    }

    fn save(&self, job: &SyncJob) -> SyncResult<()> {
        self.save_with(job, |_| Ok(()))
    }

    fn list(&self, limit: usize, offset: usize) -> SyncResult<Vec<SyncJob>> {
        Ok(self
            .jobs
            .read()
            .values()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}
