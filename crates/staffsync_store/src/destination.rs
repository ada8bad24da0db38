//! Destination store trait and the flattened destination row.
//!
//! The destination keeps one row per natural key (`erpCode`). The employee
//! phase and the employment phase each own a disjoint set of columns on that
//! row, so an [`UpsertWrite`] only ever touches the columns it carries.

use crate::error::{StoreError, StoreResult};
use crate::value::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Destination natural-key column.
pub const KEY_COLUMN: &str = "erpCode";

/// A row of the destination table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationRow {
    /// Natural key.
    pub erp_code: String,
    /// Column values, excluding the key.
    pub columns: BTreeMap<String, FieldValue>,
}

impl DestinationRow {
    /// Creates an empty row for the given key.
    pub fn new(erp_code: impl Into<String>) -> Self {
        Self {
            erp_code: erp_code.into(),
            columns: BTreeMap::new(),
        }
    }

    /// Returns a column value, if the column has ever been written.
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.columns.get(column)
    }

    /// Builds the row an insert of `write` produces.
    pub fn inserted(write: &UpsertWrite) -> Self {
        let mut row = Self::new(write.natural_key.clone());
        for (column, value) in write.insert_only.iter().chain(&write.overwrite) {
            row.columns.insert((*column).to_string(), value.clone());
        }
        row
    }

    /// Applies the update half of `write` to an existing row.
    ///
    /// Only the overwrite columns change; insert-only columns and columns
    /// owned by the other phase are left as they are.
    pub fn apply_update(&mut self, write: &UpsertWrite) {
        for (column, value) in &write.overwrite {
            self.columns.insert((*column).to_string(), value.clone());
        }
    }
}

/// An idempotent insert-or-update keyed on the natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertWrite {
    /// Natural key of the target row.
    pub natural_key: String,
    /// Columns written only when the row is inserted.
    pub insert_only: Vec<(&'static str, FieldValue)>,
    /// Columns written on insert and overwritten on update.
    pub overwrite: Vec<(&'static str, FieldValue)>,
}

/// Outcome of a single upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was created.
    Inserted,
    /// An existing row was overwritten.
    Updated,
}

/// Write access to the destination store.
///
/// All writes happen inside a [`DestinationTxn`]; nothing becomes visible
/// through [`DestinationStore::row`] until the transaction commits.
pub trait DestinationStore: Send + Sync {
    /// Begins a write transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or the transaction
    /// cannot be opened.
    fn begin(&self) -> StoreResult<Box<dyn DestinationTxn + '_>>;

    /// Reads a committed row by natural key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn row(&self, erp_code: &str) -> StoreResult<Option<DestinationRow>>;

    /// Returns the number of committed rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn row_count(&self) -> StoreResult<u64>;
}

/// An open destination transaction.
///
/// Dropping a transaction without committing discards its writes.
pub trait DestinationTxn {
    /// Inserts or updates one row.
    ///
    /// # Errors
    ///
    /// Record-level failures ([`StoreError::is_record_level`]) leave the
    /// transaction usable; any other error means the transaction is lost.
    fn upsert(&mut self, write: &UpsertWrite) -> StoreResult<UpsertOutcome>;

    /// Makes every write of this transaction durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; no write survives in that case.
    fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discards every write of this transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the store reports a rollback failure.
    fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Checks the invariants every destination enforces on a write.
pub(crate) fn check_write(write: &UpsertWrite) -> StoreResult<()> {
    if write.natural_key.is_empty() {
        return Err(StoreError::constraint(
            write.natural_key.clone(),
            format!("{KEY_COLUMN} must not be empty"),
        ));
    }
    Ok(())
}
