//! Extraction predicates.
//!
//! A [`Predicate`] describes which source rows of one entity kind take part
//! in a run. Column filters are resolved against the kind's allow-list when
//! they are added, so a predicate can only ever reference known columns.

use crate::error::{StoreError, StoreResult};
use crate::record::{EntityKind, SourceEmployee, SourceEmployment};
use crate::value::FieldValue;
use serde::{Deserialize, Serialize};

/// Comparison operator of a column filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Column equals the value (`IS NULL` for a null value).
    Eq,
    /// Column differs from the value (`IS NOT NULL` for a null value).
    Ne,
}

/// A `(column, operator, value)` triple supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFilter {
    /// Source column name.
    pub column: String,
    /// Comparison operator.
    pub op: FilterOp,
    /// Value to compare against.
    pub value: FieldValue,
}

impl ColumnFilter {
    /// Creates an equality filter.
    pub fn eq(column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    /// Creates an inequality filter.
    pub fn ne(column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Ne,
            value: value.into(),
        }
    }

    /// Returns true if the column belongs to the given kind's allow-list.
    pub fn applies_to(&self, kind: EntityKind) -> bool {
        kind.filter_column(&self.column).is_some()
    }

    fn matches(&self, actual: Option<FieldValue>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        match (self.op, &self.value) {
            (FilterOp::Eq, FieldValue::Null) => actual.is_null(),
            (FilterOp::Ne, FieldValue::Null) => !actual.is_null(),
            // SQL three-valued logic: comparing NULL never matches.
            (_, _) if actual.is_null() => false,
            (FilterOp::Eq, expected) => actual == *expected,
            (FilterOp::Ne, expected) => actual != *expected,
        }
    }
}

/// A filter whose column has been resolved against the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedFilter {
    column: &'static str,
    filter: ColumnFilter,
}

/// Row selection for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    kind: EntityKind,
    exclude_deleted: bool,
    filters: Vec<ResolvedFilter>,
}

impl Predicate {
    /// Creates a predicate that selects every row of the given kind.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            exclude_deleted: false,
            filters: Vec::new(),
        }
    }

    /// Sets whether soft-deleted rows are skipped.
    ///
    /// For employments this also skips rows whose employee is soft-deleted.
    pub fn excluding_deleted(mut self, exclude: bool) -> Self {
        self.exclude_deleted = exclude;
        self
    }

    /// Adds a column filter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownColumn`] if the column is not on the
    /// kind's allow-list.
    pub fn with_filter(mut self, filter: ColumnFilter) -> StoreResult<Self> {
        let column =
            self.kind
                .filter_column(&filter.column)
                .ok_or_else(|| StoreError::UnknownColumn {
                    kind: self.kind.to_string(),
                    column: filter.column.clone(),
                })?;
        self.filters.push(ResolvedFilter { column, filter });
        Ok(self)
    }

    /// Returns the entity kind.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Evaluates the predicate against an employee row.
    pub fn matches_employee(&self, employee: &SourceEmployee) -> bool {
        if self.exclude_deleted && employee.is_deleted() {
            return false;
        }
        self.filters
            .iter()
            .all(|f| f.filter.matches(employee.field(f.column)))
    }

    /// Evaluates the predicate against an employment row and its owner.
    ///
    /// `owner` is the referenced employee row if it exists in the source.
    pub fn matches_employment(
        &self,
        employment: &SourceEmployment,
        owner: Option<&SourceEmployee>,
    ) -> bool {
        if self.exclude_deleted {
            if employment.is_deleted() {
                return false;
            }
            // A left join leaves a missing owner as NULL, which passes
            // `deleted_at IS NULL`.
            if owner.is_some_and(SourceEmployee::is_deleted) {
                return false;
            }
        }
        self.filters
            .iter()
            .all(|f| f.filter.matches(employment.field(f.column)))
    }
}
