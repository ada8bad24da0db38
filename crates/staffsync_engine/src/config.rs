//! Configuration for sync runs and for the job manager.

use crate::error::{SyncError, SyncResult};
use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use staffsync_store::{ColumnFilter, EntityKind, Predicate};

/// Default number of records fetched per batch.
pub const DEFAULT_BATCH_SIZE: u32 = 500;

/// Smallest batch size a caller may request.
pub const MIN_BATCH_SIZE: u32 = 100;

/// Largest batch size a caller may request.
pub const MAX_BATCH_SIZE: u32 = 2000;

/// Backup tag used before every run.
pub const BACKUP_TAG: &str = "auto_pre_sync";

/// Options for a single sync run.
///
/// A snapshot of this struct is stored on the job when it is created and is
/// never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfiguration {
    /// Records fetched per batch.
    pub batch_size: u32,
    /// Take a destination backup before the first write.
    pub backup_before_sync: bool,
    /// Run the required-field checks on each record.
    pub validate_data: bool,
    /// Run the employee phase.
    pub sync_employees: bool,
    /// Run the employment phase.
    pub sync_employments: bool,
    /// Skip soft-deleted rows (and employments of soft-deleted employees).
    pub exclude_deleted: bool,
    /// Column filters. Each applies to the phase whose schema has the column.
    pub filters: Vec<ColumnFilter>,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            backup_before_sync: true,
            validate_data: true,
            sync_employees: true,
            sync_employments: true,
            exclude_deleted: true,
            filters: Vec::new(),
        }
    }
}

impl RunConfiguration {
    /// Creates the default run configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    /// Enables or disables the pre-sync backup.
    pub fn with_backup(mut self, enabled: bool) -> Self {
        self.backup_before_sync = enabled;
        self
    }

    /// Enables or disables record validation.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_data = enabled;
        self
    }

    /// Enables or disables the employee phase.
    pub fn with_employees(mut self, enabled: bool) -> Self {
        self.sync_employees = enabled;
        self
    }

    /// Enables or disables the employment phase.
    pub fn with_employments(mut self, enabled: bool) -> Self {
        self.sync_employments = enabled;
        self
    }

    /// Sets whether soft-deleted rows are skipped.
    pub fn excluding_deleted(mut self, exclude: bool) -> Self {
        self.exclude_deleted = exclude;
        self
    }

    /// Adds a column filter.
    pub fn with_filter(mut self, filter: ColumnFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Checks the configuration against the manager's batch-size bounds.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the batch size is out of
    /// range or a filter names a column neither entity kind allows.
    pub fn validate(&self, limits: &ManagerConfig) -> SyncResult<()> {
        if self.batch_size < limits.min_batch_size || self.batch_size > limits.max_batch_size {
            return Err(SyncError::InvalidConfig(format!(
                "batch size {} is outside [{}, {}]",
                self.batch_size, limits.min_batch_size, limits.max_batch_size
            )));
        }
        for filter in &self.filters {
            if !filter.applies_to(EntityKind::Employee) && !filter.applies_to(EntityKind::Employment)
            {
                return Err(SyncError::InvalidConfig(format!(
                    "column {:?} cannot be filtered",
                    filter.column
                )));
            }
        }
        Ok(())
    }

    /// Returns true if the given phase is enabled.
    pub fn includes(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Employee => self.sync_employees,
            EntityKind::Employment => self.sync_employments,
        }
    }

    /// Builds the extraction predicate for one phase.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter that claims to apply to `kind` is
    /// rejected by the predicate.
    pub fn predicate(&self, kind: EntityKind) -> SyncResult<Predicate> {
        let mut predicate = Predicate::new(kind).excluding_deleted(self.exclude_deleted);
        for filter in self.filters.iter().filter(|f| f.applies_to(kind)) {
            predicate = predicate.with_filter(filter.clone())?;
        }
        Ok(predicate)
    }
}

/// Daily schedule for the scheduled sync.
///
/// The run fires once a day at `hour:minute` local time in a fixed UTC
/// offset. The default is 01:00 at UTC+08:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Local hour (0-23).
    pub hour: u32,
    /// Local minute (0-59).
    pub minute: u32,
    /// Offset from UTC in minutes, east positive.
    pub utc_offset_minutes: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hour: 1,
            minute: 0,
            utc_offset_minutes: 8 * 60,
        }
    }
}

impl ScheduleConfig {
    /// Creates a schedule firing at `hour:minute` in the given offset.
    pub fn new(hour: u32, minute: u32, utc_offset_minutes: i32) -> Self {
        Self {
            hour,
            minute,
            utc_offset_minutes,
        }
    }

    /// Returns the local firing time.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the hour or minute is out of range.
    pub fn time(&self) -> SyncResult<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).ok_or_else(|| {
            SyncError::InvalidConfig(format!(
                "schedule time {:02}:{:02} is not a valid time of day",
                self.hour, self.minute
            ))
        })
    }

    /// Returns the UTC offset.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the offset is a day or more.
    pub fn offset(&self) -> SyncResult<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            SyncError::InvalidConfig(format!(
                "UTC offset of {} minutes is out of range",
                self.utc_offset_minutes
            ))
        })
    }
}

/// Environment key enabling the scheduled sync.
pub const ENV_SCHEDULED_SYNC_ENABLED: &str = "SCHEDULED_SYNC_ENABLED";
/// Environment key for the scheduled batch size.
pub const ENV_SYNC_PAGE_SIZE: &str = "SYNC_PAGE_SIZE";
/// Environment key enabling the backup before scheduled runs.
pub const ENV_AUTO_BACKUP_BEFORE_SYNC: &str = "AUTO_BACKUP_BEFORE_SYNC";
/// Environment key for the local schedule time (`HH:MM`).
pub const ENV_SYNC_SCHEDULE_TIME: &str = "SYNC_SCHEDULE_TIME";
/// Environment key for the schedule's UTC offset (`+HH:MM`).
pub const ENV_SYNC_SCHEDULE_UTC_OFFSET: &str = "SYNC_SCHEDULE_UTC_OFFSET";

/// Configuration of the job manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Smallest accepted batch size.
    pub min_batch_size: u32,
    /// Largest accepted batch size.
    pub max_batch_size: u32,
    /// Whether the scheduled sync runs at all.
    pub scheduled_sync_enabled: bool,
    /// Batch size of scheduled runs.
    pub scheduled_batch_size: u32,
    /// Whether scheduled runs take a backup first.
    pub auto_backup_before_sync: bool,
    /// Daily schedule.
    pub schedule: ScheduleConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            min_batch_size: MIN_BATCH_SIZE,
            max_batch_size: MAX_BATCH_SIZE,
            scheduled_sync_enabled: true,
            scheduled_batch_size: DEFAULT_BATCH_SIZE,
            auto_backup_before_sync: true,
            schedule: ScheduleConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Creates the default manager configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the accepted batch-size range.
    pub fn with_batch_bounds(mut self, min: u32, max: u32) -> Self {
        self.min_batch_size = min;
        self.max_batch_size = max;
        self
    }

    /// Enables or disables the scheduled sync.
    pub fn with_scheduled_sync(mut self, enabled: bool) -> Self {
        self.scheduled_sync_enabled = enabled;
        self
    }

    /// Sets the batch size of scheduled runs.
    pub fn with_scheduled_batch_size(mut self, size: u32) -> Self {
        self.scheduled_batch_size = size;
        self
    }

    /// Enables or disables the backup before scheduled runs.
    pub fn with_auto_backup(mut self, enabled: bool) -> Self {
        self.auto_backup_before_sync = enabled;
        self
    }

    /// Sets the daily schedule.
    pub fn with_schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.schedule = schedule;
        self
    }

    /// Returns the run configuration used by scheduled runs.
    pub fn scheduled_run_config(&self) -> RunConfiguration {
        RunConfiguration::default()
            .with_batch_size(self.scheduled_batch_size)
            .with_backup(self.auto_backup_before_sync)
    }

    /// Reads the configuration from a key lookup, falling back to defaults
    /// for absent keys.
    ///
    /// Boolean keys are enabled only by the literal `true`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if a present value cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_SCHEDULED_SYNC_ENABLED) {
            config.scheduled_sync_enabled = is_true(&value);
        }
        if let Some(value) = lookup(ENV_AUTO_BACKUP_BEFORE_SYNC) {
            config.auto_backup_before_sync = is_true(&value);
        }
        if let Some(value) = lookup(ENV_SYNC_PAGE_SIZE) {
            config.scheduled_batch_size = value.trim().parse().map_err(|_| {
                SyncError::InvalidConfig(format!("{ENV_SYNC_PAGE_SIZE}={value:?} is not a number"))
            })?;
        }
        if let Some(value) = lookup(ENV_SYNC_SCHEDULE_TIME) {
            let (hour, minute) = parse_clock(&value).ok_or_else(|| {
                SyncError::InvalidConfig(format!("{ENV_SYNC_SCHEDULE_TIME}={value:?} is not HH:MM"))
            })?;
            config.schedule.hour = hour;
            config.schedule.minute = minute;
        }
        if let Some(value) = lookup(ENV_SYNC_SCHEDULE_UTC_OFFSET) {
            config.schedule.utc_offset_minutes = parse_offset(&value).ok_or_else(|| {
                SyncError::InvalidConfig(format!(
                    "{ENV_SYNC_SCHEDULE_UTC_OFFSET}={value:?} is not +HH:MM"
                ))
            })?;
        }

        config.schedule.time()?;
        config.schedule.offset()?;
        Ok(config)
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`ManagerConfig::from_lookup`].
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

fn is_true(value: &str) -> bool {
    value.trim() == "true"
}

fn parse_clock(value: &str) -> Option<(u32, u32)> {
    let (hour, minute) = value.trim().split_once(':')?;
    Some((hour.parse().ok()?, minute.parse().ok()?))
}

fn parse_offset(value: &str) -> Option<i32> {
    let value = value.trim();
    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => (1, value),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    if !(0..60).contains(&minutes) {
        return None;
    }
    Some(sign * (hours * 60 + minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use staffsync_store::{SourceEmployee, SourceEmployment};
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn run_config_defaults() {
        let config = RunConfiguration::default();
        assert_eq!(config.batch_size, 500);
        assert!(config.backup_before_sync);
        assert!(config.validate_data);
        assert!(config.sync_employees && config.sync_employments);
        assert!(config.exclude_deleted);
        assert!(config.filters.is_empty());
    }

    #[test]
    fn batch_size_bounds() {
        let limits = ManagerConfig::default();
        for ok in [100, 500, 2000] {
            assert!(RunConfiguration::new().with_batch_size(ok).validate(&limits).is_ok());
        }
        for bad in [0, 99, 2001, 5000] {
            assert!(matches!(
                RunConfiguration::new().with_batch_size(bad).validate(&limits),
                Err(SyncError::InvalidConfig(_))
            ));
        }

        let relaxed = ManagerConfig::default().with_batch_bounds(1, 10);
        assert!(RunConfiguration::new().with_batch_size(2).validate(&relaxed).is_ok());
    }

    #[test]
    fn filters_route_to_their_phase() {
        let config = RunConfiguration::new()
            .with_filter(ColumnFilter::eq("gender", "F"))
            .with_filter(ColumnFilter::eq("department", "Mining"))
            .with_filter(ColumnFilter::ne("erp_code", "E000"));
        assert!(config.validate(&ManagerConfig::default()).is_ok());

        let employees = config.predicate(EntityKind::Employee).unwrap();
        let mut employee = SourceEmployee::new(1, "E001");
        employee.gender = Some("F".into());
        assert!(employees.matches_employee(&employee));
        employee.gender = Some("M".into());
        assert!(!employees.matches_employee(&employee));

        // department only applies to employments
        let employments = config.predicate(EntityKind::Employment).unwrap();
        let mut employment = SourceEmployment::new(10, "E001", 1);
        employment.department = Some("Mining".into());
        assert!(employments.matches_employment(&employment, None));
        employment.erp_code = Some("E000".into());
        assert!(!employments.matches_employment(&employment, None));
    }

    #[test]
    fn unknown_filter_column_is_rejected() {
        let config = RunConfiguration::new().with_filter(ColumnFilter::eq("password", "x"));
        assert!(matches!(
            config.validate(&ManagerConfig::default()),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn run_config_deserializes_partial_json() {
        let config: RunConfiguration =
            serde_json::from_str(r#"{"batch_size": 1000, "sync_employments": false}"#).unwrap();
        assert_eq!(config.batch_size, 1000);
        assert!(!config.sync_employments);
        assert!(config.sync_employees);
        assert!(config.exclude_deleted);
    }

    #[test]
    fn manager_config_from_lookup() {
        let config = ManagerConfig::from_lookup(lookup(&[
            ("SCHEDULED_SYNC_ENABLED", "false"),
            ("SYNC_PAGE_SIZE", "1000"),
            ("AUTO_BACKUP_BEFORE_SYNC", "yes"),
            ("SYNC_SCHEDULE_TIME", "02:30"),
            ("SYNC_SCHEDULE_UTC_OFFSET", "-05:00"),
        ]))
        .unwrap();

        assert!(!config.scheduled_sync_enabled);
        assert_eq!(config.scheduled_batch_size, 1000);
        assert!(!config.auto_backup_before_sync);
        assert_eq!(config.schedule, ScheduleConfig::new(2, 30, -300));

        let scheduled = config.scheduled_run_config();
        assert_eq!(scheduled.batch_size, 1000);
        assert!(!scheduled.backup_before_sync);
        assert!(scheduled.validate_data && scheduled.exclude_deleted);
    }

    #[test]
    fn manager_config_defaults_when_absent() {
        let config = ManagerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, ManagerConfig::default());
        assert!(config.scheduled_sync_enabled);
        assert_eq!(config.schedule.offset().unwrap().local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn manager_config_rejects_garbage() {
        assert!(ManagerConfig::from_lookup(lookup(&[("SYNC_PAGE_SIZE", "many")])).is_err());
        assert!(ManagerConfig::from_lookup(lookup(&[("SYNC_SCHEDULE_TIME", "25:00")])).is_err());
        assert!(ManagerConfig::from_lookup(lookup(&[("SYNC_SCHEDULE_UTC_OFFSET", "+8:75")])).is_err());
    }
}
