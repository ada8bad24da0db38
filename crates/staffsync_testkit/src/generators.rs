//! Property-based test generators using proptest.
//!
//! Generated tables keep ids and natural keys unique, so they can be loaded
//! into a source store as-is.

use crate::fixtures::{employee, erp_code};
use proptest::prelude::*;
use staffsync_store::{MemorySourceStore, SourceEmployee};

/// Strategy for optional text fields, blank values included.
pub fn optional_text_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        3 => "[A-Za-z]{1,12}".prop_map(Some),
        1 => Just(None),
        1 => Just(Some(String::new())),
        1 => Just(Some("  ".to_string())),
    ]
}

/// Strategy for an employee with the given id. Names may be missing.
pub fn employee_strategy(id: i64) -> impl Strategy<Value = SourceEmployee> {
    (optional_text_strategy(), optional_text_strategy(), any::<bool>()).prop_map(
        move |(first, last, has_phone)| {
            let mut e = employee(id);
            e.first_name = first;
            e.last_name = last;
            if !has_phone {
                e.phone_primary = None;
            }
            e
        },
    )
}

/// Strategy for an employee table of up to `max` rows with ids `1..=n`.
pub fn employee_table_strategy(max: usize) -> impl Strategy<Value = Vec<SourceEmployee>> {
    (0..=max).prop_flat_map(|n| {
        (1..=n as i64)
            .map(employee_strategy)
            .collect::<Vec<_>>()
    })
}

/// Strategy for batch sizes.
pub fn batch_size_strategy() -> impl Strategy<Value = u32> {
    1u32..=64
}

/// Loads a generated table into a source store.
pub fn source_from(employees: Vec<SourceEmployee>) -> MemorySourceStore {
    let source = MemorySourceStore::new();
    for e in employees {
        source.insert_employee(e);
    }
    source
}

/// Returns true if the employee would pass validation.
pub fn is_valid(e: &SourceEmployee) -> bool {
    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
    present(&e.erp_code) && present(&e.first_name) && present(&e.last_name)
}
