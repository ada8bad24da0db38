//! Source store trait.

use crate::error::StoreResult;
use crate::predicate::Predicate;
use crate::record::{SourceEmployee, SourceEmployment};

/// Read-only, paginated access to the source tables.
///
/// # Invariants
///
/// - `count_matching` and the fetch methods agree on which rows match
/// - fetches return rows in a stable order, so consecutive pages of an
///   unchanged source never overlap
/// - a fetch returns at most `limit` rows
pub trait SourceStore: Send + Sync {
    /// Counts the rows selected by `predicate`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn count_matching(&self, predicate: &Predicate) -> StoreResult<u64>;

    /// Fetches one page of employee rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn fetch_employees(
        &self,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<SourceEmployee>>;

    /// Fetches one page of employment rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn fetch_employments(
        &self,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<SourceEmployment>>;
}
