//! StaffSync CLI
//!
//! Command-line front end for the employee sync engine. All state lives in
//! a data directory:
//!
//! - `source.json` - snapshot of the source tables
//! - `destination.json` - the destination employee table
//! - `jobs.json` - sync job records
//! - `logs.jsonl` - per-job log entries
//! - `backups/` - pre-sync destination snapshots
//!
//! # Commands
//!
//! - `run` - Run a manual sync
//! - `jobs` - List sync jobs, newest first
//! - `job` - Show one job
//! - `logs` - Show a job's log entries
//! - `status` - Show service health
//! - `cancel` - Cancel a job
//! - `schedule` - Run the daily scheduled sync until Ctrl-C

mod commands;

use clap::{Parser, Subcommand};
use commands::OutputFormat;
use staffsync_engine::{DEFAULT_JOB_PAGE, DEFAULT_LOG_PAGE};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// StaffSync employee sync tools.
#[derive(Parser)]
#[command(name = "staffsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a manual sync
    Run {
        /// Records per batch
        #[arg(short, long)]
        batch_size: Option<u32>,

        /// Skip the pre-sync backup
        #[arg(long)]
        no_backup: bool,

        /// Skip record validation
        #[arg(long)]
        no_validate: bool,

        /// Skip the employee phase
        #[arg(long)]
        skip_employees: bool,

        /// Skip the employment phase
        #[arg(long)]
        skip_employments: bool,

        /// Include soft-deleted source rows
        #[arg(long)]
        include_deleted: bool,

        /// Column filter, `column=value` or `column!=value` (repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Who started the run
        #[arg(long, default_value = "cli")]
        initiator: String,

        /// Output format (text, json)
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List sync jobs, newest first
    Jobs {
        /// Maximum number of jobs
        #[arg(short, long, default_value_t = DEFAULT_JOB_PAGE)]
        limit: usize,

        /// Jobs to skip
        #[arg(short, long, default_value_t = 0)]
        offset: usize,

        /// Output format (text, json)
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show one job
    Job {
        /// Job id
        id: u64,

        /// Output format (text, json)
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show a job's log entries, newest first
    Logs {
        /// Job id
        id: u64,

        /// Maximum number of entries
        #[arg(short, long, default_value_t = DEFAULT_LOG_PAGE)]
        limit: usize,

        /// Entries to skip
        #[arg(short, long, default_value_t = 0)]
        offset: usize,

        /// Output format (text, json)
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show service health
    Status {
        /// Output format (text, json)
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Cancel a job
    Cancel {
        /// Job id
        id: u64,

        /// Who cancels the job
        #[arg(long, default_value = "cli")]
        initiator: String,
    },

    /// Run the daily scheduled sync until Ctrl-C
    Schedule {
        /// Run the scheduled sync once, now, and exit
        #[arg(long)]
        once: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let data_dir = commands::DataDir::new(cli.data_dir);

    match cli.command {
        Commands::Run {
            batch_size,
            no_backup,
            no_validate,
            skip_employees,
            skip_employments,
            include_deleted,
            filters,
            initiator,
            format,
        } => {
            let options = commands::run::RunOptions {
                batch_size,
                backup: !no_backup,
                validate: !no_validate,
                employees: !skip_employees,
                employments: !skip_employments,
                exclude_deleted: !include_deleted,
                filters,
            };
            commands::run::run(&data_dir, options, &initiator, format)?;
        }
        Commands::Jobs {
            limit,
            offset,
            format,
        } => commands::jobs::list(&data_dir, limit, offset, format)?,
        Commands::Job { id, format } => commands::jobs::show(&data_dir, id, format)?,
        Commands::Logs {
            id,
            limit,
            offset,
            format,
        } => commands::jobs::logs(&data_dir, id, limit, offset, format)?,
        Commands::Status { format } => commands::jobs::status(&data_dir, format)?,
        Commands::Cancel { id, initiator } => commands::jobs::cancel(&data_dir, id, &initiator)?,
        Commands::Schedule { once } => commands::schedule::run(&data_dir, once)?,
    }

    Ok(())
}
