//! Fault-injecting store and collaborator adapters.

use parking_lot::{Condvar, Mutex};
use staffsync_engine::{
    BackupReceipt, BackupService, CollaboratorError, CollaboratorResult, JobId, LogId, LogSink,
    MemoryLogSink, NewLogEntry, SyncError, SyncLogEntry, SyncResult,
};
use staffsync_store::{
    DestinationRow, DestinationStore, DestinationTxn, MemorySourceStore, Predicate,
    SourceEmployee, SourceEmployment, SourceStore, StoreError, StoreResult, UpsertOutcome,
    UpsertWrite,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A source whose connection drops after a number of successful fetches.
///
/// Counting is unaffected; only page fetches fail.
pub struct FlakySource {
    inner: Arc<MemorySourceStore>,
    healthy_fetches: usize,
    fetches: AtomicUsize,
}

impl FlakySource {
    /// Wraps `inner`, failing every fetch after the first `healthy_fetches`.
    pub fn new(inner: Arc<MemorySourceStore>, healthy_fetches: usize) -> Self {
        Self {
            inner,
            healthy_fetches,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Number of fetch calls so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check(&self) -> StoreResult<()> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst);
        if n >= self.healthy_fetches {
            return Err(StoreError::Unavailable("connection reset by peer".into()));
        }
        Ok(())
    }
}

impl SourceStore for FlakySource {
    fn count_matching(&self, predicate: &Predicate) -> StoreResult<u64> {
        self.inner.count_matching(predicate)
    }

    fn fetch_employees(
        &self,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<SourceEmployee>> {
        self.check()?;
        self.inner.fetch_employees(predicate, offset, limit)
    }

    fn fetch_employments(
        &self,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<SourceEmployment>> {
        self.check()?;
        self.inner.fetch_employments(predicate, offset, limit)
    }
}

#[derive(Default)]
struct GateState {
    fetches: usize,
    paused: bool,
    released: bool,
}

/// A source that pauses on one fetch until the test releases it.
///
/// Used to hold a run in the RUNNING state while the test cancels it or
/// tries to start another one.
pub struct GatedSource {
    inner: Arc<MemorySourceStore>,
    pause_on: usize,
    state: Mutex<GateState>,
    changed: Condvar,
}

impl GatedSource {
    /// Wraps `inner`, pausing on the fetch numbered `pause_on` (1-based).
    pub fn new(inner: Arc<MemorySourceStore>, pause_on: usize) -> Self {
        Self {
            inner,
            pause_on,
            state: Mutex::new(GateState::default()),
            changed: Condvar::new(),
        }
    }

    /// Blocks until the run reaches the paused fetch. Returns false on timeout.
    pub fn wait_until_paused(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        while !state.paused {
            if self.changed.wait_for(&mut state, timeout).timed_out() {
                return state.paused;
            }
        }
        true
    }

    /// Lets the paused fetch, and every later one, proceed.
    pub fn release(&self) {
        self.state.lock().released = true;
        self.changed.notify_all();
    }

    fn gate(&self) {
        let mut state = self.state.lock();
        state.fetches += 1;
        if state.fetches != self.pause_on {
            return;
        }
        state.paused = true;
        self.changed.notify_all();
        while !state.released {
            self.changed.wait(&mut state);
        }
    }
}

impl SourceStore for GatedSource {
    fn count_matching(&self, predicate: &Predicate) -> StoreResult<u64> {
        self.inner.count_matching(predicate)
    }

    fn fetch_employees(
        &self,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<SourceEmployee>> {
        self.gate();
        self.inner.fetch_employees(predicate, offset, limit)
    }

    fn fetch_employments(
        &self,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<SourceEmployment>> {
        self.gate();
        self.inner.fetch_employments(predicate, offset, limit)
    }
}

/// A destination that rejects chosen keys, or breaks after some writes.
pub struct FaultyDestination<D> {
    inner: D,
    rejected_keys: HashSet<String>,
    break_after_writes: Option<usize>,
    fail_commit: bool,
    writes: AtomicUsize,
}

impl<D: DestinationStore> FaultyDestination<D> {
    /// Wraps a destination without any faults.
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            rejected_keys: HashSet::new(),
            break_after_writes: None,
            fail_commit: false,
            writes: AtomicUsize::new(0),
        }
    }

    /// Rejects writes to `key` with a constraint violation.
    pub fn rejecting(mut self, key: impl Into<String>) -> Self {
        self.rejected_keys.insert(key.into());
        self
    }

    /// Loses the connection after `writes` successful upserts.
    pub fn breaking_after(mut self, writes: usize) -> Self {
        self.break_after_writes = Some(writes);
        self
    }

    /// Fails every commit.
    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// The wrapped destination.
    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: DestinationStore> DestinationStore for FaultyDestination<D> {
    fn begin(&self) -> StoreResult<Box<dyn DestinationTxn + '_>> {
        Ok(Box::new(FaultyTxn {
            inner: self.inner.begin()?,
            faults: self,
        }))
    }

    fn row(&self, erp_code: &str) -> StoreResult<Option<DestinationRow>> {
        self.inner.row(erp_code)
    }

    fn row_count(&self) -> StoreResult<u64> {
        self.inner.row_count()
    }
}

struct FaultyTxn<'a, D> {
    inner: Box<dyn DestinationTxn + 'a>,
    faults: &'a FaultyDestination<D>,
}

impl<D> DestinationTxn for FaultyTxn<'_, D> {
    fn upsert(&mut self, write: &UpsertWrite) -> StoreResult<UpsertOutcome> {
        if self.faults.rejected_keys.contains(&write.natural_key) {
            return Err(StoreError::constraint(
                write.natural_key.clone(),
                "duplicate key value violates unique constraint \"employee_registrationNumber_key\"",
            ));
        }
        if let Some(limit) = self.faults.break_after_writes {
            if self.faults.writes.load(Ordering::SeqCst) >= limit {
                return Err(StoreError::Unavailable("server closed the connection".into()));
            }
        }
        let outcome = self.inner.upsert(write)?;
        self.faults.writes.fetch_add(1, Ordering::SeqCst);
        Ok(outcome)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        if self.faults.fail_commit {
            self.inner.rollback()?;
            return Err(StoreError::Transaction("could not serialize access".into()));
        }
        self.inner.commit()
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback()
    }
}

/// A log sink that stops accepting entries after a number of appends.
pub struct FailingLogSink {
    inner: MemoryLogSink,
    healthy_appends: usize,
    appends: AtomicUsize,
}

impl FailingLogSink {
    /// Accepts the first `healthy_appends` entries, then fails.
    pub fn new(healthy_appends: usize) -> Self {
        Self {
            inner: MemoryLogSink::new(),
            healthy_appends,
            appends: AtomicUsize::new(0),
        }
    }
}

impl LogSink for FailingLogSink {
    fn append(&self, entry: NewLogEntry) -> SyncResult<LogId> {
        if self.appends.fetch_add(1, Ordering::SeqCst) >= self.healthy_appends {
            return Err(SyncError::Store(StoreError::Unavailable(
                "log table is read-only".into(),
            )));
        }
        self.inner.append(entry)
    }

    fn list(&self, job_id: JobId, limit: usize, offset: usize) -> SyncResult<Vec<SyncLogEntry>> {
        self.inner.list(job_id, limit, offset)
    }
}

/// A backup service that always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingBackup;

impl BackupService for FailingBackup {
    fn create_backup(&self, _tag: &str, _initiator: &str) -> CollaboratorResult<BackupReceipt> {
        Err(CollaboratorError::new("backup", "no space left on device"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::source_with_employees;
    use staffsync_store::{EntityKind, FieldValue, MemoryDestinationStore};

    fn write(key: &str) -> UpsertWrite {
        UpsertWrite {
            natural_key: key.into(),
            insert_only: vec![],
            overwrite: vec![("firstName", FieldValue::text("Bat"))],
        }
    }

    #[test]
    fn flaky_source_fails_after_budget() {
        let source = FlakySource::new(Arc::new(source_with_employees(4)), 1);
        let predicate = Predicate::new(EntityKind::Employee);
        assert_eq!(source.fetch_employees(&predicate, 0, 2).unwrap().len(), 2);
        assert!(matches!(
            source.fetch_employees(&predicate, 2, 2),
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(source.count_matching(&predicate).unwrap(), 4);
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn faulty_destination_rejects_and_breaks() {
        let dest = FaultyDestination::new(MemoryDestinationStore::new())
            .rejecting("E002")
            .breaking_after(2);
        let mut txn = dest.begin().unwrap();
        txn.upsert(&write("E001")).unwrap();
        assert!(txn.upsert(&write("E002")).unwrap_err().is_record_level());
        txn.upsert(&write("E003")).unwrap();
        assert!(!txn.upsert(&write("E004")).unwrap_err().is_record_level());
        txn.commit().unwrap();
        assert_eq!(dest.row_count().unwrap(), 2);
    }

    #[test]
    fn failing_commit_publishes_nothing() {
        let dest = FaultyDestination::new(MemoryDestinationStore::new()).failing_commit();
        let mut txn = dest.begin().unwrap();
        txn.upsert(&write("E001")).unwrap();
        assert!(txn.commit().is_err());
        assert_eq!(dest.inner().row_count().unwrap(), 0);
    }

    #[test]
    fn failing_log_sink() {
        let sink = FailingLogSink::new(1);
        sink.append(NewLogEntry::info(1, "ok")).unwrap();
        assert!(sink.append(NewLogEntry::info(1, "lost")).is_err());
        assert_eq!(sink.list(1, 10, 0).unwrap().len(), 1);
    }
}
