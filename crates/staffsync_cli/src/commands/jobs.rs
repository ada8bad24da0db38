//! Job inspection and cancellation commands.

use super::{print_job_detail, print_job_line, print_json, DataDir, OutputFormat};
use staffsync_engine::JobId;

/// Lists jobs, newest first.
pub fn list(
    data_dir: &DataDir,
    limit: usize,
    offset: usize,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = data_dir.open_reader()?;
    let jobs = manager.list_jobs(limit, offset)?;

    match format {
        OutputFormat::Json => print_json(&jobs)?,
        OutputFormat::Text => {
            if jobs.is_empty() {
                println!("No sync jobs");
            }
            for job in &jobs {
                print_job_line(job);
            }
        }
    }
    Ok(())
}

/// Shows one job.
pub fn show(
    data_dir: &DataDir,
    job_id: JobId,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = data_dir.open_reader()?;
    let job = manager.get_job(job_id)?;

    match format {
        OutputFormat::Json => print_json(&job)?,
        OutputFormat::Text => print_job_detail(&job),
    }
    Ok(())
}

/// Shows a job's log entries, newest first.
pub fn logs(
    data_dir: &DataDir,
    job_id: JobId,
    limit: usize,
    offset: usize,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = data_dir.open_reader()?;
    let entries = manager.list_logs(job_id, limit, offset)?;

    match format {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Text => {
            for entry in &entries {
                println!(
                    "{}  {:<5}  {}",
                    entry.created_at.format("%Y-%m-%d %H:%M:%S%.3f"),
                    entry.level.as_str(),
                    entry.message
                );
            }
        }
    }
    Ok(())
}

/// Shows service health and the most recent jobs.
pub fn status(data_dir: &DataDir, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let manager = data_dir.open_reader()?;
    let status = manager.service_status()?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Text => {
            println!("Healthy: {}", status.is_healthy);
            println!("Running jobs: {}", status.running_jobs);
            match status.last_successful_sync {
                Some(at) => println!("Last successful sync: {at}"),
                None => println!("Last successful sync: never"),
            }
            println!("Recent jobs:");
            for job in &status.recent_jobs {
                print_job_line(job);
            }
        }
    }
    Ok(())
}

/// Cancels a job.
///
/// A process running a sync holds the directory lock, so from the command
/// line this marks a job left RUNNING by an interrupted process as
/// CANCELLED.
pub fn cancel(
    data_dir: &DataDir,
    job_id: JobId,
    initiator: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = data_dir.open_manager(false)?;
    let job = manager.cancel_job(job_id, initiator)?;
    println!("✓ Job {} {}", job.id, job.status);
    Ok(())
}
