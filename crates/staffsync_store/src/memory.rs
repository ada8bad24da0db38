//! In-memory source and destination stores.

use crate::destination::{
    check_write, DestinationRow, DestinationStore, DestinationTxn, UpsertOutcome, UpsertWrite,
};
use crate::error::{StoreError, StoreResult};
use crate::predicate::Predicate;
use crate::record::{EntityKind, SourceEmployee, SourceEmployment, SourceId};
use crate::source::SourceStore;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A serializable copy of the source tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSnapshot {
    /// Employee rows.
    pub employees: Vec<SourceEmployee>,
    /// Employment rows.
    pub employments: Vec<SourceEmployment>,
}

/// An in-memory source store.
///
/// Employees and employments live in two tables keyed by source id.
/// Pages are returned in ascending id order, which keeps pagination stable
/// while the tables are not modified.
///
/// # Example
///
/// ```rust
/// use staffsync_store::{EntityKind, MemorySourceStore, Predicate, SourceEmployee, SourceStore};
///
/// let source = MemorySourceStore::new();
/// source.insert_employee(SourceEmployee::new(1, "E001"));
/// source.insert_employee(SourceEmployee::new(2, "E002"));
///
/// let predicate = Predicate::new(EntityKind::Employee);
/// assert_eq!(source.count_matching(&predicate).unwrap(), 2);
/// assert_eq!(source.fetch_employees(&predicate, 1, 10).unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemorySourceStore {
    employees: RwLock<BTreeMap<SourceId, SourceEmployee>>,
    employments: RwLock<BTreeMap<SourceId, SourceEmployment>>,
}

impl MemorySourceStore {
    /// Creates an empty source store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source store holding the rows of a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: SourceSnapshot) -> Self {
        let store = Self::new();
        for employee in snapshot.employees {
            store.insert_employee(employee);
        }
        for employment in snapshot.employments {
            store.insert_employment(employment);
        }
        store
    }

    /// Returns a copy of every row.
    #[must_use]
    pub fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            employees: self.employees.read().values().cloned().collect(),
            employments: self.employments.read().values().cloned().collect(),
        }
    }

    /// Inserts or replaces an employee row by id.
    pub fn insert_employee(&self, employee: SourceEmployee) {
        self.employees.write().insert(employee.id, employee);
    }

    /// Inserts or replaces an employment row by id.
    pub fn insert_employment(&self, employment: SourceEmployment) {
        self.employments.write().insert(employment.id, employment);
    }

    /// Marks an employee as soft-deleted. Returns false if the id is unknown.
    pub fn soft_delete_employee(&self, id: SourceId, at: DateTime<Utc>) -> bool {
        match self.employees.write().get_mut(&id) {
            Some(employee) => {
                employee.deleted_at = Some(at);
                true
            }
            None => false,
        }
    }

    /// Marks an employment as soft-deleted. Returns false if the id is unknown.
    pub fn soft_delete_employment(&self, id: SourceId, at: DateTime<Utc>) -> bool {
        match self.employments.write().get_mut(&id) {
            Some(employment) => {
                employment.deleted_at = Some(at);
                true
            }
            None => false,
        }
    }

    /// Returns an employee row by id.
    #[must_use]
    pub fn employee(&self, id: SourceId) -> Option<SourceEmployee> {
        self.employees.read().get(&id).cloned()
    }

    fn matching_employments(&self, predicate: &Predicate) -> Vec<SourceEmployment> {
        let employees = self.employees.read();
        self.employments
            .read()
            .values()
            .filter(|emp| predicate.matches_employment(emp, employees.get(&emp.employee_id)))
            .cloned()
            .collect()
    }
}

fn page<T>(rows: impl Iterator<Item = T>, offset: u64, limit: u64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    rows.skip(offset).take(limit).collect()
}

impl SourceStore for MemorySourceStore {
    fn count_matching(&self, predicate: &Predicate) -> StoreResult<u64> {
        let count = match predicate.kind() {
            EntityKind::Employee => self
                .employees
                .read()
                .values()
                .filter(|e| predicate.matches_employee(e))
                .count(),
            EntityKind::Employment => self.matching_employments(predicate).len(),
        };
        Ok(count as u64)
    }

    fn fetch_employees(
        &self,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<SourceEmployee>> {
        if predicate.kind() != EntityKind::Employee {
            return Err(StoreError::Corrupted(format!(
                "{} predicate used to fetch employees",
                predicate.kind()
            )));
        }
        let employees = self.employees.read();
        let rows = employees
            .values()
            .filter(|e| predicate.matches_employee(e))
            .cloned();
        Ok(page(rows, offset, limit))
    }

    fn fetch_employments(
        &self,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<SourceEmployment>> {
        if predicate.kind() != EntityKind::Employment {
            return Err(StoreError::Corrupted(format!(
                "{} predicate used to fetch employments",
                predicate.kind()
            )));
        }
        Ok(page(
            self.matching_employments(predicate).into_iter(),
            offset,
            limit,
        ))
    }
}

/// An in-memory destination store.
///
/// Only one write transaction may be open at a time. Writes are staged in
/// the transaction and published on commit.
#[derive(Debug, Default)]
pub struct MemoryDestinationStore {
    rows: RwLock<BTreeMap<String, DestinationRow>>,
    write_lock: Mutex<()>,
    required_columns: Vec<&'static str>,
}

impl MemoryDestinationStore {
    /// Creates an empty destination store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a destination store holding the given rows.
    #[must_use]
    pub fn with_rows(rows: impl IntoIterator<Item = DestinationRow>) -> Self {
        let store = Self::new();
        store.replace_rows(
            rows.into_iter()
                .map(|row| (row.erp_code.clone(), row))
                .collect(),
        );
        store
    }

    /// Declares columns that must be non-null on every row (NOT NULL).
    #[must_use]
    pub fn with_required_columns(mut self, columns: &[&'static str]) -> Self {
        self.required_columns = columns.to_vec();
        self
    }

    /// Returns a copy of every committed row, ordered by natural key.
    #[must_use]
    pub fn rows(&self) -> Vec<DestinationRow> {
        self.rows.read().values().cloned().collect()
    }

    pub(crate) fn replace_rows(&self, rows: BTreeMap<String, DestinationRow>) {
        *self.rows.write() = rows;
    }

    pub(crate) fn begin_memory(&self) -> StoreResult<MemoryTxn<'_>> {
        let guard = self.write_lock.try_lock().ok_or_else(|| {
            StoreError::Transaction("a write transaction is already open".into())
        })?;
        Ok(MemoryTxn {
            store: self,
            staged: BTreeMap::new(),
            _guard: guard,
        })
    }

    fn check_required(&self, row: &DestinationRow) -> StoreResult<()> {
        for column in &self.required_columns {
            if row.get(column).map_or(true, |value| value.is_null()) {
                return Err(StoreError::constraint(
                    row.erp_code.clone(),
                    format!("null value in column {column:?} violates not-null constraint"),
                ));
            }
        }
        Ok(())
    }
}

impl DestinationStore for MemoryDestinationStore {
    fn begin(&self) -> StoreResult<Box<dyn DestinationTxn + '_>> {
        Ok(Box::new(self.begin_memory()?))
    }

    fn row(&self, erp_code: &str) -> StoreResult<Option<DestinationRow>> {
        Ok(self.rows.read().get(erp_code).cloned())
    }

    fn row_count(&self) -> StoreResult<u64> {
        Ok(self.rows.read().len() as u64)
    }
}

/// A write transaction on a [`MemoryDestinationStore`].
pub(crate) struct MemoryTxn<'a> {
    store: &'a MemoryDestinationStore,
    staged: BTreeMap<String, DestinationRow>,
    _guard: MutexGuard<'a, ()>,
}

impl MemoryTxn<'_> {
    /// Publishes the staged rows after `persist` accepted the merged table.
    pub(crate) fn commit_with(
        self,
        persist: impl FnOnce(&BTreeMap<String, DestinationRow>) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let mut merged = self.store.rows.read().clone();
        merged.extend(self.staged);
        persist(&merged)?;
        self.store.replace_rows(merged);
        Ok(())
    }

    pub(crate) fn staged_len(&self) -> usize {
        self.staged.len()
    }
}

impl DestinationTxn for MemoryTxn<'_> {
    fn upsert(&mut self, write: &UpsertWrite) -> StoreResult<UpsertOutcome> {
        check_write(write)?;

        let existing = match self.staged.get(&write.natural_key) {
            Some(row) => Some(row.clone()),
            None => self.store.rows.read().get(&write.natural_key).cloned(),
        };

        let (row, outcome) = match existing {
            Some(mut row) => {
                row.apply_update(write);
                (row, UpsertOutcome::Updated)
            }
            None => (DestinationRow::inserted(write), UpsertOutcome::Inserted),
        };
        self.store.check_required(&row)?;

        self.staged.insert(write.natural_key.clone(), row);
        Ok(outcome)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        self.commit_with(|_| Ok(()))
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
