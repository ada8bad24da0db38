//! Test fixtures and data-directory helpers.
//!
//! Provides realistic source rows and temporary directories laid out the
//! way the CLI expects them.

use chrono::{NaiveDate, TimeZone, Utc};
use staffsync_engine::ManagerConfig;
use staffsync_store::{
    write_json_atomic, MemorySourceStore, SourceEmployee, SourceEmployment, SourceId,
    SourceSnapshot,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Formats the natural key used for a source id (`E001`, `E002`, ...).
pub fn erp_code(id: SourceId) -> String {
    format!("E{id:03}")
}

/// Builds a complete, valid employee.
pub fn employee(id: SourceId) -> SourceEmployee {
    let mut e = SourceEmployee::new(id, erp_code(id));
    e.registration_number = Some(format!("UB{id:08}"));
    e.first_name = Some(format!("Bat{id}"));
    e.last_name = Some(format!("Dorj{id}"));
    e.phone_primary = Some(format!("9911{:04}", id));
    e.email = Some(format!("e{id}@example.mn"));
    e.gender = Some(if id % 2 == 0 { "F" } else { "M" }.to_string());
    e.company_enrolled_date = NaiveDate::from_ymd_opt(2020, 1, 1);
    e.first_enrolled_date = NaiveDate::from_ymd_opt(2018, 6, 15);
    e.created_at = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp");
    e.updated_at = e.created_at;
    e
}

/// Builds a valid employment owned by employee `employee_id`.
pub fn employment(id: SourceId, employee_id: SourceId) -> SourceEmployment {
    let mut e = SourceEmployment::new(id, erp_code(employee_id), employee_id);
    e.grade = Some("G5".into());
    e.company = Some("Mining LLC".into());
    e.department = Some(if employee_id % 2 == 0 { "Mining" } else { "Processing" }.into());
    e.position = Some("Operator".into());
    e.employee_status = Some("active".into());
    e.is_roster = employee_id % 3 == 0;
    e
}

/// Creates a source with `n` valid employees (ids `1..=n`) and no employments.
pub fn source_with_employees(n: SourceId) -> MemorySourceStore {
    let source = MemorySourceStore::new();
    for id in 1..=n {
        source.insert_employee(employee(id));
    }
    source
}

/// Creates a source with `n` employees, each with one employment
/// (employment id `1000 + employee id`).
pub fn populated_source(n: SourceId) -> MemorySourceStore {
    let source = source_with_employees(n);
    for id in 1..=n {
        source.insert_employment(employment(1000 + id, id));
    }
    source
}

/// Manager configuration accepting any batch size from 1 to 2000.
pub fn relaxed_config() -> ManagerConfig {
    ManagerConfig::default().with_batch_bounds(1, 2000)
}

/// A temporary data directory in the layout the CLI uses.
pub struct TestDataDir {
    dir: TempDir,
}

impl TestDataDir {
    /// Creates an empty data directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Creates a data directory whose source document holds `snapshot`.
    pub fn with_source(snapshot: &SourceSnapshot) -> Self {
        let data = Self::new();
        write_json_atomic(&data.source_path(), snapshot).expect("Failed to write source");
        data
    }

    /// Root of the directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Source snapshot document.
    pub fn source_path(&self) -> PathBuf {
        self.path().join("source.json")
    }

    /// Destination document.
    pub fn destination_path(&self) -> PathBuf {
        self.path().join("destination.json")
    }

    /// Job store document.
    pub fn jobs_path(&self) -> PathBuf {
        self.path().join("jobs.json")
    }

    /// Log file.
    pub fn logs_path(&self) -> PathBuf {
        self.path().join("logs.jsonl")
    }
}

impl Default for TestDataDir {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use staffsync_store::{EntityKind, Predicate, SourceStore};

    #[test]
    fn populated_source_links_employments() {
        let source = populated_source(4);
        let snapshot = source.snapshot();
        assert_eq!(snapshot.employees.len(), 4);
        assert_eq!(snapshot.employments.len(), 4);
        for employment in &snapshot.employments {
            let owner = source.employee(employment.employee_id).unwrap();
            assert_eq!(owner.erp_code, employment.erp_code);
        }
        let predicate = Predicate::new(EntityKind::Employment);
        assert_eq!(source.count_matching(&predicate).unwrap(), 4);
    }

    #[test]
    fn data_dir_writes_source() {
        let data = TestDataDir::with_source(&populated_source(2).snapshot());
        assert!(data.source_path().exists());
        assert!(!data.destination_path().exists());
    }
}
