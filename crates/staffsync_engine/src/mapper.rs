//! Mapping of source records onto the flattened destination row.
//!
//! The employee phase and the employment phase own disjoint sets of
//! destination columns. `createdAt` is the only column both may write, and
//! only when their write inserts the row.

use staffsync_store::{FieldValue, SourceEmployee, SourceEmployment, UpsertWrite};

/// Destination columns written by the employee phase.
pub const EMPLOYEE_COLUMNS: &[&str] = &[
    "registrationNumber",
    "firstName",
    "lastName",
    "phoneNumber",
    "phoneNumber2",
    "workEmail",
    "gender",
    "startWorkingDate",
    "firstStartWorkingDate",
    "emergencyContactName",
    "emergencyContactPhone",
    "portraitImage",
    "portraitImageFallback",
    "updatedAt",
    "deletedAt",
];

/// Destination columns written by the employment phase.
pub const EMPLOYMENT_COLUMNS: &[&str] = &[
    "grade",
    "commuteFrom",
    "vehicleType",
    "workLocation",
    "rosterSchedule",
    "rosterType",
    "company",
    "unit",
    "unitAbbr",
    "unitAbbr2",
    "code",
    "section",
    "sectionAbbr",
    "office",
    "officeAbbr",
    "officeMn",
    "department",
    "departmentAbbr",
    "division",
    "position",
    "positionType",
    "isRoster",
    "workingCondition",
    "status",
    "employmentCondition",
    "isUHGCampResident",
    "isTKHCampResident",
    "employmentUpdatedAt",
    "employmentDeletedAt",
];

/// Insert-only creation timestamp column.
pub const CREATED_AT_COLUMN: &str = "createdAt";

/// Maps an employee record to its destination write.
///
/// A missing natural key maps to an empty key, which the destination
/// rejects as a record-level failure.
pub fn map_employee(employee: &SourceEmployee) -> UpsertWrite {
    let e = employee;
    let values: [FieldValue; 15] = [
        e.registration_number.clone().into(),
        e.first_name.clone().into(),
        e.last_name.clone().into(),
        e.phone_primary.clone().into(),
        e.phone_secondary.clone().into(),
        e.email.clone().into(),
        e.gender.clone().into(),
        e.company_enrolled_date.into(),
        e.first_enrolled_date.into(),
        e.emergency_contact_name.clone().into(),
        e.emergency_contact_phone.clone().into(),
        e.portrait_image.clone().into(),
        e.portrait_image_fallback.clone().into(),
        e.updated_at.into(),
        e.deleted_at.into(),
    ];

    UpsertWrite {
        natural_key: e.erp_code.clone().unwrap_or_default(),
        insert_only: vec![(CREATED_AT_COLUMN, e.created_at.into())],
        overwrite: EMPLOYEE_COLUMNS.iter().copied().zip(values).collect(),
    }
}

/// Maps an employment record to its destination write.
///
/// The source's `subsection` lands in `section` and its `section` in
/// `office`; the destination names the levels differently.
pub fn map_employment(employment: &SourceEmployment) -> UpsertWrite {
    let e = employment;
    let values: [FieldValue; 29] = [
        e.grade.clone().into(),
        e.commute_from.clone().into(),
        e.vehicle_type.clone().into(),
        e.work_location.clone().into(),
        e.roster_schedule.clone().into(),
        e.roster_type.clone().into(),
        e.company.clone().into(),
        e.unit.clone().into(),
        e.unit_abbr.clone().into(),
        e.unit_abbr2.clone().into(),
        e.code.clone().into(),
        e.subsection.clone().into(),
        e.subsection_abbr.clone().into(),
        e.section.clone().into(),
        e.section_abbr.clone().into(),
        e.section_mn.clone().into(),
        e.department.clone().into(),
        e.department_abbr.clone().into(),
        e.division.clone().into(),
        e.position.clone().into(),
        e.position_type.clone().into(),
        e.is_roster.into(),
        e.working_condition.clone().into(),
        e.employee_status.clone().into(),
        e.employment_condition.clone().into(),
        e.is_uhg_camp_resident.into(),
        e.is_tkh_camp_resident.into(),
        e.updated_at.into(),
        e.deleted_at.into(),
    ];

    UpsertWrite {
        natural_key: e.erp_code.clone().unwrap_or_default(),
        insert_only: vec![(CREATED_AT_COLUMN, e.created_at.into())],
        overwrite: EMPLOYMENT_COLUMNS.iter().copied().zip(values).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use staffsync_store::DestinationRow;

    fn employee() -> SourceEmployee {
        let mut e = SourceEmployee::new(1, "E001");
        e.first_name = Some("Bat".into());
        e.last_name = Some("Dorj".into());
        e.phone_primary = Some("99112233".into());
        e.company_enrolled_date = NaiveDate::from_ymd_opt(2020, 3, 1);
        e
    }

    #[test]
    fn employee_columns_follow_the_destination_names() {
        let write = map_employee(&employee());
        assert_eq!(write.natural_key, "E001");
        let row = DestinationRow::inserted(&write);
        assert_eq!(row.get("firstName"), Some(&FieldValue::text("Bat")));
        assert_eq!(row.get("phoneNumber"), Some(&FieldValue::text("99112233")));
        assert_eq!(row.get("phoneNumber2"), Some(&FieldValue::Null));
        assert_eq!(
            row.get("startWorkingDate"),
            NaiveDate::from_ymd_opt(2020, 3, 1).map(FieldValue::Date).as_ref()
        );
        assert!(row.get("createdAt").is_some());
    }

    #[test]
    fn employment_renames_section_levels() {
        let mut e = SourceEmployment::new(5, "E001", 1);
        e.subsection = Some("Drilling".into());
        e.section = Some("Open Pit".into());
        e.is_roster = true;

        let row = DestinationRow::inserted(&map_employment(&e));
        assert_eq!(row.get("section"), Some(&FieldValue::text("Drilling")));
        assert_eq!(row.get("office"), Some(&FieldValue::text("Open Pit")));
        assert_eq!(row.get("isRoster"), Some(&FieldValue::Bool(true)));
    }

    #[test]
    fn phases_write_disjoint_columns() {
        for column in EMPLOYEE_COLUMNS {
            assert!(!EMPLOYMENT_COLUMNS.contains(column), "{column} is shared");
        }
        assert_eq!(map_employee(&employee()).overwrite.len(), EMPLOYEE_COLUMNS.len());
    }

    #[test]
    fn update_keeps_created_at_and_other_phase() {
        let first = employee();
        let mut row = DestinationRow::inserted(&map_employee(&first));
        row.apply_update(&map_employment(&SourceEmployment::new(5, "E001", 1)));

        let mut changed = first.clone();
        changed.first_name = Some("Bold".into());
        changed.created_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        row.apply_update(&map_employee(&changed));

        assert_eq!(row.get("firstName"), Some(&FieldValue::text("Bold")));
        assert_eq!(row.get("createdAt"), Some(&FieldValue::Timestamp(first.created_at)));
        assert_eq!(row.get("isRoster"), Some(&FieldValue::Bool(false)));
    }

    #[test]
    fn missing_key_maps_to_empty_key() {
        let mut e = employee();
        e.erp_code = None;
        assert_eq!(map_employee(&e).natural_key, "");
    }
}
