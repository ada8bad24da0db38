//! The batch sync engine.
//!
//! The engine runs the employee phase and then the employment phase inside
//! a single destination transaction. Each phase counts its rows once, walks
//! them page by page and upserts them one at a time. A record that fails
//! validation or is rejected by the destination is counted and logged, and
//! the run moves on. Anything else aborts the run and rolls the transaction
//! back.

use crate::config::RunConfiguration;
use crate::error::{RecordError, SyncError, SyncResult, ValidationError};
use crate::job::{Counters, JobId};
use crate::log::{LogSink, NewLogEntry};
use crate::mapper::{map_employee, map_employment};
use crate::progress::{batch_windows, ProgressTracker};
use crate::validate::{validate_employee, validate_employment};
use serde_json::json;
use staffsync_store::{
    DestinationStore, DestinationTxn, EntityKind, Predicate, SourceEmployee, SourceEmployment,
    SourceId, SourceStore, StoreResult, UpsertOutcome, UpsertWrite,
};
use tracing::{debug, info, warn};

/// Hooks the engine calls while a run is in progress.
pub trait RunObserver {
    /// Persists the cumulative counters after a batch.
    ///
    /// # Errors
    ///
    /// An error aborts the run.
    fn checkpoint(&self, counters: Counters) -> SyncResult<()>;

    /// Returns true once cancellation has been requested.
    fn is_cancelled(&self) -> bool;
}

/// Counters and per-record messages of a committed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Final counters.
    pub counters: Counters,
    /// Messages of failed records, in processing order.
    pub errors: Vec<String>,
}

/// One entity kind's extraction, validation and mapping.
trait SyncPhase {
    type Record;

    const KIND: EntityKind;
    /// Capitalised noun used in log messages.
    const NOUN: &'static str;

    fn fetch(
        source: &dyn SourceStore,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<Self::Record>>;
    fn validate(record: &Self::Record) -> Result<(), ValidationError>;
    fn map(record: &Self::Record) -> UpsertWrite;
    fn key(record: &Self::Record) -> Option<&str>;
    fn source_id(record: &Self::Record) -> SourceId;
}

struct EmployeePhase;

impl SyncPhase for EmployeePhase {
    type Record = SourceEmployee;

    const KIND: EntityKind = EntityKind::Employee;
    const NOUN: &'static str = "Employee";

    fn fetch(
        source: &dyn SourceStore,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<SourceEmployee>> {
        source.fetch_employees(predicate, offset, limit)
    }

    fn validate(record: &SourceEmployee) -> Result<(), ValidationError> {
        validate_employee(record)
    }

    fn map(record: &SourceEmployee) -> UpsertWrite {
        map_employee(record)
    }

    fn key(record: &SourceEmployee) -> Option<&str> {
        record.erp_code.as_deref()
    }

    fn source_id(record: &SourceEmployee) -> SourceId {
        record.id
    }
}

struct EmploymentPhase;

impl SyncPhase for EmploymentPhase {
    type Record = SourceEmployment;

    const KIND: EntityKind = EntityKind::Employment;
    const NOUN: &'static str = "Employment";

    fn fetch(
        source: &dyn SourceStore,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<SourceEmployment>> {
        source.fetch_employments(predicate, offset, limit)
    }

    fn validate(record: &SourceEmployment) -> Result<(), ValidationError> {
        validate_employment(record)
    }

    fn map(record: &SourceEmployment) -> UpsertWrite {
        map_employment(record)
    }

    fn key(record: &SourceEmployment) -> Option<&str> {
        record.erp_code.as_deref()
    }

    fn source_id(record: &SourceEmployment) -> SourceId {
        record.id
    }
}

/// Runs one sync over borrowed stores.
pub struct SyncEngine<'a> {
    source: &'a dyn SourceStore,
    destination: &'a dyn DestinationStore,
    logs: &'a dyn LogSink,
}

impl<'a> SyncEngine<'a> {
    /// Creates an engine over the given stores.
    pub fn new(
        source: &'a dyn SourceStore,
        destination: &'a dyn DestinationStore,
        logs: &'a dyn LogSink,
    ) -> Self {
        Self {
            source,
            destination,
            logs,
        }
    }

    /// Runs both enabled phases for `job_id` and commits the result.
    ///
    /// # Errors
    ///
    /// Returns the systemic error that aborted the run, or
    /// [`SyncError::Cancelled`]. In both cases nothing was committed.
    pub fn run(
        &self,
        job_id: JobId,
        config: &RunConfiguration,
        observer: &dyn RunObserver,
    ) -> SyncResult<RunOutcome> {
        let mut txn = self.destination.begin()?;
        let mut tracker = ProgressTracker::new();

        let result = self.run_phases(job_id, config, observer, &mut *txn, &mut tracker);
        match result {
            Ok(()) => {
                txn.commit()?;
                let (counters, errors) = tracker.into_parts();
                info!(
                    job_id,
                    processed = counters.processed(),
                    success = counters.success(),
                    failed = counters.failed(),
                    "Sync committed"
                );
                Ok(RunOutcome { counters, errors })
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback() {
                    warn!(job_id, error = %rollback, "Rollback failed");
                }
                debug!(job_id, error = %e, "Sync rolled back");
                Err(e)
            }
        }
    }

    fn run_phases(
        &self,
        job_id: JobId,
        config: &RunConfiguration,
        observer: &dyn RunObserver,
        txn: &mut (dyn DestinationTxn + '_),
        tracker: &mut ProgressTracker,
    ) -> SyncResult<()> {
        if config.includes(EntityKind::Employee) {
            self.run_phase::<EmployeePhase>(job_id, config, observer, txn, tracker)?;
        }
        if config.includes(EntityKind::Employment) {
            self.run_phase::<EmploymentPhase>(job_id, config, observer, txn, tracker)?;
        }
        Ok(())
    }

    fn run_phase<P: SyncPhase>(
        &self,
        job_id: JobId,
        config: &RunConfiguration,
        observer: &dyn RunObserver,
        txn: &mut (dyn DestinationTxn + '_),
        tracker: &mut ProgressTracker,
    ) -> SyncResult<()> {
        if observer.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let predicate = config.predicate(P::KIND)?;
        let total = self.source.count_matching(&predicate)?;
        info!(job_id, kind = %P::KIND, total, "Starting phase");
        self.logs.append(NewLogEntry::info(
            job_id,
            format!("Found {total} {}s to sync", P::KIND),
        ))?;

        let page_size = u64::from(config.batch_size);
        for window in batch_windows(total, page_size) {
            let rows = P::fetch(self.source, &predicate, window.offset, page_size)?;
            for record in &rows {
                self.sync_record::<P>(job_id, config, txn, tracker, record)?;
            }

            observer.checkpoint(tracker.finish_batch(P::KIND, window, rows.len()))?;
            if observer.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
        }
        Ok(())
    }

    fn sync_record<P: SyncPhase>(
        &self,
        job_id: JobId,
        config: &RunConfiguration,
        txn: &mut (dyn DestinationTxn + '_),
        tracker: &mut ProgressTracker,
        record: &P::Record,
    ) -> SyncResult<()> {
        let key = P::key(record).unwrap_or_default();

        match Self::apply::<P>(config, txn, record)? {
            Ok(outcome) => {
                tracker.record_success();
                let mut entry =
                    NewLogEntry::info(job_id, format!("{} {key} synced successfully", P::NOUN));
                if outcome == UpsertOutcome::Inserted {
                    entry = entry.with_metadata(json!({ "outcome": "inserted" }));
                }
                self.logs.append(entry.with_key(key))?;
            }
            Err(err) => {
                let message = format!(
                    "Failed to sync {} {key}: {err}",
                    P::NOUN.to_ascii_lowercase()
                );
                debug!(job_id, kind = %P::KIND, key, stage = err.stage(), error = %err, "Record failed");
                self.logs.append(
                    NewLogEntry::error(job_id, message.clone())
                        .with_key(key)
                        .with_metadata(json!({
                            "stage": err.stage(),
                            "error": err.to_string(),
                            "source_id": P::source_id(record),
                        })),
                )?;
                tracker.record_failure(message);
            }
        }
        Ok(())
    }

    /// Validates and writes one record. The outer error is systemic; the
    /// inner one belongs to the record.
    fn apply<P: SyncPhase>(
        config: &RunConfiguration,
        txn: &mut (dyn DestinationTxn + '_),
        record: &P::Record,
    ) -> SyncResult<Result<UpsertOutcome, RecordError>> {
        if config.validate_data {
            if let Err(e) = P::validate(record) {
                return Ok(Err(e.into()));
            }
        }
        match txn.upsert(&P::map(record)) {
            Ok(outcome) => Ok(Ok(outcome)),
            Err(e) if e.is_record_level() => Ok(Err(RecordError::Write(e))),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogLevel, MemoryLogSink};
    use parking_lot::Mutex;
    use staffsync_store::{MemoryDestinationStore, MemorySourceStore};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Recorder {
        checkpoints: Mutex<Vec<Counters>>,
        cancel_after: Option<usize>,
        cancelled: AtomicBool,
    }

    impl RunObserver for Recorder {
        fn checkpoint(&self, counters: Counters) -> SyncResult<()> {
            let mut checkpoints = self.checkpoints.lock();
            checkpoints.push(counters);
            if self.cancel_after == Some(checkpoints.len()) {
                self.cancelled.store(true, Ordering::SeqCst);
            }
            Ok(())
        }

        fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::SeqCst)
        }
    }

    fn source(n: i64) -> MemorySourceStore {
        let source = MemorySourceStore::new();
        for id in 1..=n {
            let mut e = SourceEmployee::new(id, format!("E{id:03}"));
            e.first_name = Some(format!("First{id}"));
            e.last_name = Some(format!("Last{id}"));
            source.insert_employee(e);
            source.insert_employment(SourceEmployment::new(100 + id, format!("E{id:03}"), id));
        }
        source
    }

    fn config(batch: u32) -> RunConfiguration {
        RunConfiguration::default().with_batch_size(batch)
    }

    #[test]
    fn both_phases_write_one_row_per_key() {
        let source = source(3);
        let dest = MemoryDestinationStore::new();
        let logs = MemoryLogSink::new();
        let observer = Recorder::default();

        let outcome = SyncEngine::new(&source, &dest, &logs)
            .run(1, &config(2), &observer)
            .unwrap();

        assert_eq!(outcome.counters.processed(), 6);
        assert_eq!(outcome.counters.success(), 6);
        assert!(outcome.errors.is_empty());
        assert_eq!(dest.row_count().unwrap(), 3);
        // two employee batches, two employment batches
        assert_eq!(observer.checkpoints.lock().len(), 4);

        let row = dest.row("E002").unwrap().unwrap();
        assert!(row.get("firstName").is_some());
        assert!(row.get("isRoster").is_some());
    }

    #[test]
    fn invalid_record_is_counted_and_skipped() {
        let source = source(3);
        let mut broken = source.employee(2).unwrap();
        broken.first_name = None;
        source.insert_employee(broken);

        let dest = MemoryDestinationStore::new();
        let logs = MemoryLogSink::new();
        let outcome = SyncEngine::new(&source, &dest, &logs)
            .run(1, &config(10).with_employments(false), &Recorder::default())
            .unwrap();

        assert_eq!(outcome.counters.processed(), 3);
        assert_eq!(outcome.counters.failed(), 1);
        assert_eq!(outcome.errors, vec!["Failed to sync employee E002: first_name is required"]);
        assert!(dest.row("E002").unwrap().is_none());
        assert!(dest.row("E003").unwrap().is_some());

        let errors: Vec<_> = logs
            .entries()
            .into_iter()
            .filter(|e| e.level == LogLevel::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].erp_code.as_deref(), Some("E002"));
    }

    #[test]
    fn validation_can_be_disabled() {
        let source = source(1);
        let mut broken = source.employee(1).unwrap();
        broken.last_name = None;
        source.insert_employee(broken);

        let dest = MemoryDestinationStore::new();
        let logs = MemoryLogSink::new();
        let outcome = SyncEngine::new(&source, &dest, &logs)
            .run(
                1,
                &config(10).with_validation(false).with_employments(false),
                &Recorder::default(),
            )
            .unwrap();
        assert_eq!(outcome.counters.success(), 1);
    }

    #[test]
    fn cancellation_rolls_back() {
        let source = source(4);
        let dest = MemoryDestinationStore::new();
        let logs = MemoryLogSink::new();
        let observer = Recorder {
            cancel_after: Some(1),
            ..Recorder::default()
        };

        let err = SyncEngine::new(&source, &dest, &logs)
            .run(1, &config(2), &observer)
            .unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert_eq!(dest.row_count().unwrap(), 0);
        assert_eq!(observer.checkpoints.lock().len(), 1);
    }
}
