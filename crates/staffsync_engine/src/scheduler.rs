//! Daily timer for the scheduled sync.

use crate::config::ScheduleConfig;
use crate::error::{SyncError, SyncResult};
use crate::manager::JobManager;
use chrono::{DateTime, TimeZone, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Returns the first firing time strictly after `now`.
///
/// # Errors
///
/// Returns [`SyncError::InvalidConfig`] if the schedule is invalid.
pub fn next_run_after(schedule: &ScheduleConfig, now: DateTime<Utc>) -> SyncResult<DateTime<Utc>> {
    let offset = schedule.offset()?;
    let time = schedule.time()?;
    let mut date = now.with_timezone(&offset).date_naive();

    for _ in 0..2 {
        if let Some(local) = offset.from_local_datetime(&date.and_time(time)).single() {
            let candidate = local.with_timezone(&Utc);
            if candidate > now {
                return Ok(candidate);
            }
        }
        date = date
            .succ_opt()
            .ok_or_else(|| SyncError::InvalidConfig("schedule ran past the calendar".into()))?;
    }
    Err(SyncError::InvalidConfig(format!(
        "no firing time after {now} for {schedule:?}"
    )))
}

/// Runs the scheduled sync once a day until `shutdown` resolves.
///
/// Each run executes on a blocking thread. A run in progress is finished
/// before shutdown is observed.
///
/// # Errors
///
/// Returns an error only if the schedule is invalid.
pub async fn run_daily<F>(manager: Arc<JobManager>, shutdown: F) -> SyncResult<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        let now = Utc::now();
        let next = next_run_after(&manager.config().schedule, now)?;
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next, "Next scheduled sync");

        tokio::select! {
            _ = &mut shutdown => {
                info!("Scheduler stopped");
                return Ok(());
            }
            _ = tokio::time::sleep(wait) => {}
        }

        let runner = Arc::clone(&manager);
        match tokio::task::spawn_blocking(move || runner.run_scheduled_sync()).await {
            Ok(Ok(Some(report))) => info!(
                job_id = report.job_id,
                status = %report.status,
                processed = report.records_processed,
                "Scheduled sync finished"
            ),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => warn!(error = %e, "Scheduled sync did not run"),
            Err(e) => error!(error = %e, "Scheduled sync task aborted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use staffsync_store::{MemoryDestinationStore, MemorySourceStore};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn fires_at_one_in_the_morning_utc_plus_eight() {
        let schedule = ScheduleConfig::default();
        // 2026-03-10 12:00 UTC is 20:00 local; next run is 01:00 local on the 11th.
        assert_eq!(
            next_run_after(&schedule, at(2026, 3, 10, 12, 0)).unwrap(),
            at(2026, 3, 10, 17, 0)
        );
        // 16:59 UTC is 00:59 local on the 11th.
        assert_eq!(
            next_run_after(&schedule, at(2026, 3, 10, 16, 59)).unwrap(),
            at(2026, 3, 10, 17, 0)
        );
    }

    #[test]
    fn exact_firing_time_moves_to_next_day() {
        let schedule = ScheduleConfig::default();
        assert_eq!(
            next_run_after(&schedule, at(2026, 3, 10, 17, 0)).unwrap(),
            at(2026, 3, 11, 17, 0)
        );
    }

    #[test]
    fn negative_offsets() {
        let schedule = ScheduleConfig::new(23, 30, -5 * 60);
        // 03:00 UTC is 22:00 local the previous day.
        assert_eq!(
            next_run_after(&schedule, at(2026, 1, 1, 3, 0)).unwrap(),
            at(2026, 1, 1, 4, 30)
        );
    }

    #[test]
    fn invalid_schedule_is_rejected() {
        let schedule = ScheduleConfig::new(24, 0, 0);
        assert!(next_run_after(&schedule, Utc::now()).is_err());
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let manager = Arc::new(
            JobManager::builder(
                Arc::new(MemorySourceStore::new()),
                Arc::new(MemoryDestinationStore::new()),
            )
            .build(),
        );
        run_daily(Arc::clone(&manager), async {}).await.unwrap();
        assert!(manager.list_jobs(10, 0).unwrap().is_empty());
    }
}
