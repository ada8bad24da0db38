//! Read-only projections of the source employee and employment tables.
//!
//! Both tables are keyed by their source id. An employment references its
//! owning employee through `employee_id` only; the two records never embed
//! each other.

use crate::value::FieldValue;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source-side primary key.
pub type SourceId = i64;

/// The two entity shapes that are replicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Rows of the source `employee` table.
    Employee,
    /// Rows of the source `employee_employment` table.
    Employment,
}

impl EntityKind {
    /// Returns the lowercase name used in logs and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Employee => "employee",
            EntityKind::Employment => "employment",
        }
    }

    /// Returns the columns a filter may reference for this kind.
    pub fn filter_columns(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Employee => EMPLOYEE_FILTER_COLUMNS,
            EntityKind::Employment => EMPLOYMENT_FILTER_COLUMNS,
        }
    }

    /// Resolves a user-supplied column name against the allow-list.
    ///
    /// The returned name is the static allow-list entry, never the input.
    pub fn filter_column(&self, column: &str) -> Option<&'static str> {
        self.filter_columns()
            .iter()
            .copied()
            .find(|candidate| *candidate == column)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Employee columns that may appear in a filter.
pub const EMPLOYEE_FILTER_COLUMNS: &[&str] = &[
    "erp_code",
    "registration_number",
    "first_name",
    "last_name",
    "email",
    "gender",
];

/// Employment columns that may appear in a filter.
pub const EMPLOYMENT_FILTER_COLUMNS: &[&str] = &[
    "erp_code",
    "grade",
    "work_location",
    "roster_type",
    "company",
    "unit",
    "section",
    "department",
    "division",
    "position",
    "position_type",
    "is_roster",
    "employee_status",
    "employment_condition",
];

/// A row of the source employee table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceEmployee {
    /// Source id.
    pub id: SourceId,
    /// Natural key shared with the destination.
    pub erp_code: Option<String>,
    /// National registration number.
    pub registration_number: Option<String>,
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Primary phone number.
    pub phone_primary: Option<String>,
    /// Secondary phone number.
    pub phone_secondary: Option<String>,
    /// Work email address.
    pub email: Option<String>,
    /// Gender code.
    pub gender: Option<String>,
    /// Date the employee joined the current company.
    pub company_enrolled_date: Option<NaiveDate>,
    /// Date the employee first joined the group.
    pub first_enrolled_date: Option<NaiveDate>,
    /// Emergency contact name.
    pub emergency_contact_name: Option<String>,
    /// Emergency contact phone.
    pub emergency_contact_phone: Option<String>,
    /// Portrait image URL.
    pub portrait_image: Option<String>,
    /// Fallback portrait image URL.
    pub portrait_image_fallback: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SourceEmployee {
    /// Creates an employee with the given id and natural key.
    pub fn new(id: SourceId, erp_code: impl Into<String>) -> Self {
        Self {
            id,
            erp_code: Some(erp_code.into()),
            ..Default::default()
        }
    }

    /// Returns true if the row carries a soft-delete marker.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Reads a filterable column by name.
    pub fn field(&self, column: &str) -> Option<FieldValue> {
        let value = match column {
            "erp_code" => self.erp_code.clone().into(),
            "registration_number" => self.registration_number.clone().into(),
            "first_name" => self.first_name.clone().into(),
            "last_name" => self.last_name.clone().into(),
            "email" => self.email.clone().into(),
            "gender" => self.gender.clone().into(),
            _ => return None,
        };
        Some(value)
    }
}

/// A row of the source employment table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceEmployment {
    /// Source id.
    pub id: SourceId,
    /// Natural key shared with the destination.
    pub erp_code: Option<String>,
    /// Id of the owning employee row.
    pub employee_id: SourceId,
    /// Pay grade.
    pub grade: Option<String>,
    /// Commute origin.
    pub commute_from: Option<String>,
    /// Commute vehicle type.
    pub vehicle_type: Option<String>,
    /// Work site.
    pub work_location: Option<String>,
    /// Roster schedule code.
    pub roster_schedule: Option<String>,
    /// Roster type.
    pub roster_type: Option<String>,
    /// Employing company.
    pub company: Option<String>,
    /// Organisational unit.
    pub unit: Option<String>,
    /// Unit abbreviation.
    pub unit_abbr: Option<String>,
    /// Secondary unit abbreviation.
    pub unit_abbr2: Option<String>,
    /// Organisational code.
    pub code: Option<String>,
    /// Subsection name.
    pub subsection: Option<String>,
    /// Subsection abbreviation.
    pub subsection_abbr: Option<String>,
    /// Section name.
    pub section: Option<String>,
    /// Section abbreviation.
    pub section_abbr: Option<String>,
    /// Section name (local language).
    pub section_mn: Option<String>,
    /// Department name.
    pub department: Option<String>,
    /// Department abbreviation.
    pub department_abbr: Option<String>,
    /// Division name.
    pub division: Option<String>,
    /// Job title.
    pub position: Option<String>,
    /// Position category.
    pub position_type: Option<String>,
    /// Whether the employee works a roster.
    pub is_roster: bool,
    /// Working condition code.
    pub working_condition: Option<String>,
    /// Employment status.
    pub employee_status: Option<String>,
    /// Employment condition code.
    pub employment_condition: Option<String>,
    /// Resident of the UHG camp.
    pub is_uhg_camp_resident: bool,
    /// Resident of the TKH camp.
    pub is_tkh_camp_resident: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SourceEmployment {
    /// Creates an employment with the given id, natural key and owner.
    pub fn new(id: SourceId, erp_code: impl Into<String>, employee_id: SourceId) -> Self {
        Self {
            id,
            erp_code: Some(erp_code.into()),
            employee_id,
            ..Default::default()
        }
    }

    /// Returns true if the row carries a soft-delete marker.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Reads a filterable column by name.
    pub fn field(&self, column: &str) -> Option<FieldValue> {
        let value = match column {
            "erp_code" => self.erp_code.clone().into(),
            "grade" => self.grade.clone().into(),
            "work_location" => self.work_location.clone().into(),
            "roster_type" => self.roster_type.clone().into(),
            "company" => self.company.clone().into(),
            "unit" => self.unit.clone().into(),
            "section" => self.section.clone().into(),
            "department" => self.department.clone().into(),
            "division" => self.division.clone().into(),
            "position" => self.position.clone().into(),
            "position_type" => self.position_type.clone().into(),
            "is_roster" => self.is_roster.into(),
            "employee_status" => self.employee_status.clone().into(),
            "employment_condition" => self.employment_condition.clone().into(),
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_lists_cover_field_readers() {
        let employee = SourceEmployee::new(1, "E001");
        for column in EMPLOYEE_FILTER_COLUMNS {
            assert!(employee.field(column).is_some(), "{column}");
        }

        let employment = SourceEmployment::new(1, "E001", 1);
        for column in EMPLOYMENT_FILTER_COLUMNS {
            assert!(employment.field(column).is_some(), "{column}");
        }
    }

    #[test]
    fn filter_column_rejects_unknown_names() {
        assert_eq!(EntityKind::Employee.filter_column("email"), Some("email"));
        assert_eq!(EntityKind::Employee.filter_column("department"), None);
        assert_eq!(
            EntityKind::Employment.filter_column("e.deleted_at; DROP TABLE employee"),
            None
        );
    }

    #[test]
    fn employment_deserializes_with_defaults() {
        let json = r#"{"id": 7, "erp_code": "E007", "employee_id": 3, "is_roster": true}"#;
        let employment: SourceEmployment = serde_json::from_str(json).unwrap();
        assert_eq!(employment.employee_id, 3);
        assert!(employment.is_roster);
        assert!(employment.department.is_none());
        assert!(!employment.is_deleted());
    }
}
