//! # StaffSync Store
//!
//! Record store adapters for StaffSync.
//!
//! This crate is the leaf of the workspace. It knows the shape of the two
//! replicated source tables and of the flattened destination table, and how
//! to read and write them. It knows nothing about jobs, validation or
//! progress.
//!
//! ## Design Principles
//!
//! - The source is read-only and paginated ([`SourceStore`])
//! - The destination is written only inside a transaction
//!   ([`DestinationStore`], [`DestinationTxn`])
//! - Filters are resolved against a fixed allow-list of columns before they
//!   can be turned into a query ([`Predicate`])
//! - Errors say whether they concern one row or the whole store
//!   ([`StoreError::is_record_level`])
//!
//! ## Available Adapters
//!
//! - [`MemorySourceStore`] / [`MemoryDestinationStore`] - in-process tables
//! - [`FileDestinationStore`] - destination persisted as a JSON document
//! - [`load_source_snapshot`] - source loaded from a JSON document
//! - [`DirLock`] - single-writer lock on a data directory
//!
//! ## Example
//!
//! ```rust
//! use staffsync_store::{DestinationStore, FieldValue, MemoryDestinationStore, UpsertWrite};
//!
//! let dest = MemoryDestinationStore::new();
//! let mut txn = dest.begin().unwrap();
//! txn.upsert(&UpsertWrite {
//!     natural_key: "E001".into(),
//!     insert_only: vec![],
//!     overwrite: vec![("firstName", FieldValue::text("Bat"))],
//! })
//! .unwrap();
//! txn.commit().unwrap();
//! assert_eq!(dest.row_count().unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod destination;
mod error;
mod file;
mod lock;
mod memory;
mod predicate;
mod record;
mod source;
mod value;

pub use destination::{
    DestinationRow, DestinationStore, DestinationTxn, UpsertOutcome, UpsertWrite, KEY_COLUMN,
};
pub use error::{StoreError, StoreResult};
pub use file::{load_source_snapshot, read_json, write_json_atomic, FileDestinationStore};
pub use lock::{DirLock, LOCK_FILE};
pub use memory::{MemoryDestinationStore, MemorySourceStore, SourceSnapshot};
pub use predicate::{ColumnFilter, FilterOp, Predicate};
pub use record::{
    EntityKind, SourceEmployee, SourceEmployment, SourceId, EMPLOYEE_FILTER_COLUMNS,
    EMPLOYMENT_FILTER_COLUMNS,
};
pub use source::SourceStore;
pub use value::FieldValue;
