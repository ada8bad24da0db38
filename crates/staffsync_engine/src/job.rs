//! Sync jobs, their state machine and the run report.

use crate::config::RunConfiguration;
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Job identifier, assigned by the job store in creation order.
pub type JobId = u64;

/// How a job was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Started by an operator.
    Manual,
    /// Started by the daily schedule.
    Scheduled,
    /// Started by another system.
    Auto,
}

impl JobKind {
    /// Returns the kind as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Manual => "manual",
            JobKind::Scheduled => "scheduled",
            JobKind::Auto => "auto",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job.
///
/// ```text
/// PENDING -> RUNNING -> COMPLETED
///                    -> FAILED
///                    -> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not started.
    Pending,
    /// The engine is working on it.
    Running,
    /// Finished; per-record failures may still have occurred.
    Completed,
    /// Aborted by a systemic error.
    Failed,
    /// Stopped on request.
    Cancelled,
}

impl JobStatus {
    /// Returns the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Returns true if the transition `self -> to` is legal.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record counters of a run.
///
/// The fields are private so that `processed == success + failed` holds for
/// every value of this type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    processed: u64,
    success: u64,
    failed: u64,
}

impl Counters {
    /// Records processed so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Records written successfully.
    pub fn success(&self) -> u64 {
        self.success
    }

    /// Records that failed validation or the write.
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Counts a successful record.
    pub fn record_success(&mut self) {
        self.processed += 1;
        self.success += 1;
    }

    /// Counts a failed record.
    pub fn record_failure(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }

    /// Returns true if no counter is below its value in `earlier`.
    pub fn dominates(&self, earlier: &Counters) -> bool {
        self.processed >= earlier.processed
            && self.success >= earlier.success
            && self.failed >= earlier.failed
    }
}

/// A sync job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    /// Job id.
    pub id: JobId,
    /// Display name.
    pub name: String,
    /// How the job was started.
    pub kind: JobKind,
    /// Current status.
    pub status: JobStatus,
    /// Who started the job (a user id or `system`).
    pub initiator: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time the job entered RUNNING.
    pub started_at: Option<DateTime<Utc>>,
    /// Time the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Time of the last change.
    pub updated_at: DateTime<Utc>,
    /// Record counters, as of the last checkpoint.
    pub counters: Counters,
    /// Configuration snapshot.
    pub config: RunConfiguration,
    /// Failure or cancellation message.
    pub error_message: Option<String>,
}

impl SyncJob {
    /// Applies a status transition and stamps the matching timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTransition`] if the transition is illegal.
    pub fn transition(&mut self, to: JobStatus, now: DateTime<Utc>) -> SyncResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(SyncError::InvalidTransition {
                job_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        if to == JobStatus::Running {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Replaces the counters. Rejected once the job is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTransition`] if the job is not running.
    pub fn checkpoint(&mut self, counters: Counters, now: DateTime<Utc>) -> SyncResult<()> {
        if self.status != JobStatus::Running {
            return Err(SyncError::InvalidTransition {
                job_id: self.id,
                from: self.status,
                to: JobStatus::Running,
            });
        }
        self.counters = counters;
        self.updated_at = now;
        Ok(())
    }

    /// Run duration, if the job has started.
    pub fn duration_ms(&self) -> Option<i64> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or(self.updated_at);
        Some((end - started).num_milliseconds())
    }
}

/// A job about to be created.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Display name.
    pub name: String,
    /// How the job was started.
    pub kind: JobKind,
    /// Who started it.
    pub initiator: String,
    /// Configuration snapshot.
    pub config: RunConfiguration,
}

impl NewJob {
    /// Builds the PENDING job with the given id.
    pub fn into_job(self, id: JobId, now: DateTime<Utc>) -> SyncJob {
        SyncJob {
            id,
            name: self.name,
            kind: self.kind,
            status: JobStatus::Pending,
            initiator: self.initiator,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            counters: Counters::default(),
            config: self.config,
            error_message: None,
        }
    }
}

/// Result of a triggered run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// The job that ran.
    pub job_id: JobId,
    /// Final status of the job.
    pub status: JobStatus,
    /// True if the job completed.
    pub success: bool,
    /// Records processed.
    pub records_processed: u64,
    /// Records written.
    pub records_success: u64,
    /// Records that failed.
    pub records_failed: u64,
    /// Per-record messages, or the single systemic message.
    pub errors: Vec<String>,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

/// Health summary of the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Always true while the manager answers.
    pub is_healthy: bool,
    /// Jobs currently RUNNING among the most recent ones.
    pub running_jobs: usize,
    /// Completion time of the most recent COMPLETED job.
    pub last_successful_sync: Option<DateTime<Utc>>,
    /// The three most recent jobs.
    pub recent_jobs: Vec<SyncJob>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> SyncJob {
        NewJob {
            name: "Manual Sync".into(),
            kind: JobKind::Manual,
            initiator: "u1".into(),
            config: RunConfiguration::default(),
        }
        .into_job(1, Utc::now())
    }

    #[test]
    fn legal_transitions() {
        use JobStatus::*;
        let all = [Pending, Running, Completed, Failed, Cancelled];
        for from in all {
            for to in all {
                let legal = matches!(
                    (from, to),
                    (Pending, Running)
                        | (Running, Completed)
                        | (Running, Failed)
                        | (Running, Cancelled)
                );
                assert_eq!(from.can_transition_to(to), legal, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn transition_stamps_times() {
        let mut job = job();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.duration_ms().is_none());

        job.transition(JobStatus::Running, Utc::now()).unwrap();
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_none());

        job.transition(JobStatus::Completed, Utc::now()).unwrap();
        assert!(job.completed_at.is_some());
        assert!(job.duration_ms().unwrap() >= 0);
    }

    #[test]
    fn terminal_jobs_are_frozen() {
        let mut job = job();
        job.transition(JobStatus::Running, Utc::now()).unwrap();
        job.transition(JobStatus::Failed, Utc::now()).unwrap();

        let err = job.transition(JobStatus::Cancelled, Utc::now()).unwrap_err();
        assert!(matches!(err, SyncError::InvalidTransition { from: JobStatus::Failed, .. }));

        let mut counters = Counters::default();
        counters.record_success();
        assert!(job.checkpoint(counters, Utc::now()).is_err());
        assert_eq!(job.counters, Counters::default());
    }

    #[test]
    fn counters_stay_balanced() {
        let mut counters = Counters::default();
        let before = counters;
        counters.record_success();
        counters.record_failure();
        counters.record_success();
        assert_eq!(counters.processed(), 3);
        assert_eq!(counters.success(), 2);
        assert_eq!(counters.failed(), 1);
        assert!(counters.dominates(&before));
        assert!(!before.dominates(&counters));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobStatus::Cancelled).unwrap(), "\"cancelled\"");
        assert_eq!(serde_json::to_string(&JobKind::Scheduled).unwrap(), "\"scheduled\"");
    }
}
