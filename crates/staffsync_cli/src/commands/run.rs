//! Manual sync command.

use super::{print_json, DataDir, OutputFormat};
use staffsync_engine::{RunConfiguration, SyncReport};
use staffsync_store::{ColumnFilter, FieldValue};

/// Options of a manual run, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Records per batch. `None` keeps the default.
    pub batch_size: Option<u32>,
    /// Take a backup first.
    pub backup: bool,
    /// Validate records before writing.
    pub validate: bool,
    /// Run the employee phase.
    pub employees: bool,
    /// Run the employment phase.
    pub employments: bool,
    /// Skip soft-deleted source rows.
    pub exclude_deleted: bool,
    /// Raw `column=value` / `column!=value` filters.
    pub filters: Vec<String>,
}

impl RunOptions {
    /// Builds the run configuration.
    pub fn into_config(self) -> Result<RunConfiguration, String> {
        let mut config = RunConfiguration::new()
            .with_backup(self.backup)
            .with_validation(self.validate)
            .with_employees(self.employees)
            .with_employments(self.employments)
            .excluding_deleted(self.exclude_deleted);
        if let Some(size) = self.batch_size {
            config = config.with_batch_size(size);
        }
        for raw in &self.filters {
            config = config.with_filter(parse_filter(raw)?);
        }
        Ok(config)
    }
}

/// Parses `column=value` or `column!=value`.
///
/// `true` and `false` become booleans and `null` becomes a null comparison.
/// Anything else is compared as text.
pub fn parse_filter(raw: &str) -> Result<ColumnFilter, String> {
    let (column, value, negate) = match raw.split_once("!=") {
        Some((column, value)) => (column, value, true),
        None => match raw.split_once('=') {
            Some((column, value)) => (column, value, false),
            None => return Err(format!("Invalid filter {raw:?}, expected column=value")),
        },
    };
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("Invalid filter {raw:?}, missing column"));
    }

    let value = match value.trim() {
        "true" => FieldValue::Bool(true),
        "false" => FieldValue::Bool(false),
        "null" => FieldValue::Null,
        text => FieldValue::from(text),
    };
    Ok(if negate {
        ColumnFilter::ne(column, value)
    } else {
        ColumnFilter::eq(column, value)
    })
}

/// Runs a manual sync and prints the report.
///
/// Returns an error if the run did not complete, so the exit status
/// reflects the outcome.
pub fn run(
    data_dir: &DataDir,
    options: RunOptions,
    initiator: &str,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = options.into_config()?;
    let manager = data_dir.open_manager(true)?;
    let report = manager.trigger_sync(config, initiator)?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => print_report(&report),
    }

    if report.success {
        Ok(())
    } else {
        Err(format!("Sync job {} ended {}", report.job_id, report.status).into())
    }
}

fn print_report(report: &SyncReport) {
    let mark = if report.success { "✓" } else { "✗" };
    println!("{mark} Sync job {} {}", report.job_id, report.status);
    println!("  Processed: {}", report.records_processed);
    println!("  Succeeded: {}", report.records_success);
    println!("  Failed: {}", report.records_failed);
    println!("  Duration: {} ms", report.duration_ms);
    for error in &report.errors {
        println!("  - {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use staffsync_store::FilterOp;

    #[test]
    fn parses_equality_and_inequality() {
        let eq = parse_filter("department=Mining").unwrap();
        assert_eq!(eq, ColumnFilter::eq("department", "Mining"));

        let ne = parse_filter("gender != F").unwrap();
        assert_eq!(ne.column, "gender");
        assert_eq!(ne.op, FilterOp::Ne);
        assert_eq!(ne.value, FieldValue::from("F"));
    }

    #[test]
    fn parses_booleans_and_null() {
        assert_eq!(
            parse_filter("is_roster=true").unwrap().value,
            FieldValue::Bool(true)
        );
        assert_eq!(
            parse_filter("email!=null").unwrap(),
            ColumnFilter::ne("email", FieldValue::Null)
        );
    }

    #[test]
    fn rejects_malformed_filters() {
        assert!(parse_filter("department").is_err());
        assert!(parse_filter("=Mining").is_err());
    }

    #[test]
    fn options_map_onto_the_run_configuration() {
        let config = RunOptions {
            batch_size: Some(250),
            backup: false,
            validate: true,
            employees: true,
            employments: false,
            exclude_deleted: true,
            filters: vec!["department=Mining".into()],
        }
        .into_config()
        .unwrap();

        assert_eq!(config.batch_size, 250);
        assert!(!config.backup_before_sync);
        assert!(config.validate_data);
        assert!(!config.sync_employments);
        assert_eq!(config.filters, vec![ColumnFilter::eq("department", "Mining")]);
    }
}
