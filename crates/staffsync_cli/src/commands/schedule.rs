//! Daily scheduled sync.

use super::DataDir;
use staffsync_engine::{next_run_after, run_daily};
use tracing::{info, warn};

/// Runs the scheduled sync.
///
/// With `once` the sync runs immediately and the command exits. Otherwise
/// the scheduler waits for the configured time every day until Ctrl-C.
pub fn run(data_dir: &DataDir, once: bool) -> Result<(), Box<dyn std::error::Error>> {
    let session = data_dir.open_manager(true)?;
    let manager = session.shared();

    if once {
        return match manager.run_scheduled_sync()? {
            Some(report) if report.success => {
                println!(
                    "✓ Scheduled sync job {} completed: {} ok, {} failed",
                    report.job_id, report.records_success, report.records_failed
                );
                Ok(())
            }
            Some(report) => {
                Err(format!("Scheduled sync job {} ended {}", report.job_id, report.status).into())
            }
            None => {
                println!("Scheduled sync is disabled");
                Ok(())
            }
        };
    }

    let next = next_run_after(&manager.config().schedule, chrono::Utc::now())?;
    info!(next_run = %next, "Starting scheduler, press Ctrl-C to stop");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_daily(manager, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for Ctrl-C");
        }
    }))?;
    Ok(())
}
