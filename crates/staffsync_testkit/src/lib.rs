//! # StaffSync Testkit
//!
//! Test utilities for StaffSync.
//!
//! This crate provides:
//! - Realistic source fixtures and temporary data directories
//! - Property-based generators for source tables
//! - Fault-injecting sources, destinations, log sinks and backups
//! - Recording collaborators (backup, audit, notifier)
//! - A fully wired job manager harness
//!
//! ## Usage
//!
//! ```rust
//! use staffsync_engine::RunConfiguration;
//! use staffsync_testkit::prelude::*;
//! use std::sync::Arc;
//!
//! let harness = SyncHarness::new(Arc::new(source_with_employees(3)));
//! let report = harness
//!     .manager
//!     .trigger_sync(RunConfiguration::default().with_batch_size(2), "tester")
//!     .unwrap();
//! assert_eq!(report.records_success, 3);
//! assert_eq!(harness.row_count(), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod harness;
pub mod recorders;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
    pub use crate::recorders::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use harness::*;
pub use recorders::*;
