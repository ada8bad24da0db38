//! Required-field checks on source records.

use crate::error::ValidationError;
use staffsync_store::{SourceEmployee, SourceEmployment};

/// Absent and empty values are missing. Whitespace is kept as data.
fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

fn require(value: &Option<String>, field: &'static str) -> Result<(), ValidationError> {
    if present(value) {
        Ok(())
    } else {
        Err(ValidationError { field })
    }
}

/// Checks that an employee has a natural key, a first name and a last name.
///
/// # Errors
///
/// Returns the first missing field, in that order.
pub fn validate_employee(employee: &SourceEmployee) -> Result<(), ValidationError> {
    require(&employee.erp_code, "erp_code")?;
    require(&employee.first_name, "first_name")?;
    require(&employee.last_name, "last_name")
}

/// Checks that an employment has a natural key.
///
/// # Errors
///
/// Returns the missing field.
pub fn validate_employment(employment: &SourceEmployment) -> Result<(), ValidationError> {
    require(&employment.erp_code, "erp_code")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee(first: Option<&str>, last: Option<&str>) -> SourceEmployee {
        let mut e = SourceEmployee::new(1, "E001");
        e.first_name = first.map(String::from);
        e.last_name = last.map(String::from);
        e
    }

    #[test]
    fn complete_employee_passes() {
        assert!(validate_employee(&employee(Some("Bat"), Some("Dorj"))).is_ok());
    }

    #[test]
    fn missing_fields_are_named() {
        let err = validate_employee(&employee(None, Some("Dorj"))).unwrap_err();
        assert_eq!(err.field, "first_name");

        let err = validate_employee(&employee(Some("Bat"), Some(""))).unwrap_err();
        assert_eq!(err.field, "last_name");

        let mut keyless = employee(Some("Bat"), Some("Dorj"));
        keyless.erp_code = Some(String::new());
        assert_eq!(validate_employee(&keyless).unwrap_err().field, "erp_code");
    }

    #[test]
    fn whitespace_only_names_are_present() {
        assert!(validate_employee(&employee(Some(" "), Some("\t"))).is_ok());

        let mut blank_key = employee(Some("Bat"), Some("Dorj"));
        blank_key.erp_code = Some("  ".into());
        assert!(validate_employee(&blank_key).is_ok());
    }

    #[test]
    fn employment_needs_only_a_key() {
        let mut employment = SourceEmployment::new(1, "E001", 1);
        assert!(validate_employment(&employment).is_ok());
        employment.erp_code = None;
        assert_eq!(validate_employment(&employment).unwrap_err().field, "erp_code");
    }
}
