//! Per-job log entries and the sinks that keep them.
//!
//! These entries are the persisted audit trail of a run, one per record
//! outcome plus a few run-level messages. Operational diagnostics go through
//! `tracing` instead.

use crate::error::SyncResult;
use crate::job::JobId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Log entry identifier.
pub type LogId = u64;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Normal progress.
    Info,
    /// Unexpected but harmless.
    Warn,
    /// A record or the run failed.
    Error,
    /// Diagnostic detail.
    Debug,
}

impl LogLevel {
    /// Returns the level as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// Entry id, increasing in append order.
    pub id: LogId,
    /// Owning job.
    pub job_id: JobId,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Natural key of the record concerned, if any.
    pub erp_code: Option<String>,
    /// Structured detail.
    pub metadata: Option<serde_json::Value>,
    /// Append time.
    pub created_at: DateTime<Utc>,
}

/// A log entry about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    /// Owning job.
    pub job_id: JobId,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Natural key of the record concerned, if any.
    pub erp_code: Option<String>,
    /// Structured detail.
    pub metadata: Option<serde_json::Value>,
}

impl NewLogEntry {
    /// Creates an entry with the given level.
    pub fn new(job_id: JobId, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            job_id,
            level,
            message: message.into(),
            erp_code: None,
            metadata: None,
        }
    }

    /// Creates an info entry.
    pub fn info(job_id: JobId, message: impl Into<String>) -> Self {
        Self::new(job_id, LogLevel::Info, message)
    }

    /// Creates a warn entry.
    pub fn warn(job_id: JobId, message: impl Into<String>) -> Self {
        Self::new(job_id, LogLevel::Warn, message)
    }

    /// Creates an error entry.
    pub fn error(job_id: JobId, message: impl Into<String>) -> Self {
        Self::new(job_id, LogLevel::Error, message)
    }

    /// Creates a debug entry.
    pub fn debug(job_id: JobId, message: impl Into<String>) -> Self {
        Self::new(job_id, LogLevel::Debug, message)
    }

    /// Attaches the natural key of the record concerned.
    pub fn with_key(mut self, erp_code: impl Into<String>) -> Self {
        self.erp_code = Some(erp_code.into());
        self
    }

    /// Attaches structured detail.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Builds the stored entry.
    pub fn into_entry(self, id: LogId, now: DateTime<Utc>) -> SyncLogEntry {
        SyncLogEntry {
            id,
            job_id: self.job_id,
            level: self.level,
            message: self.message,
            erp_code: self.erp_code,
            metadata: self.metadata,
            created_at: now,
        }
    }
}

/// Append-only store of log entries.
pub trait LogSink: Send + Sync {
    /// Appends an entry and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be stored. The engine treats
    /// this as a systemic failure.
    fn append(&self, entry: NewLogEntry) -> SyncResult<LogId>;

    /// Lists a job's entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the entries cannot be read.
    fn list(&self, job_id: JobId, limit: usize, offset: usize) -> SyncResult<Vec<SyncLogEntry>>;
}

/// In-memory log sink.
///
/// Keeps every entry for the life of the sink. Long-running processes use
/// [`JsonLogSink`](crate::JsonLogSink).
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    entries: RwLock<Vec<SyncLogEntry>>,
}

impl MemoryLogSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every entry, oldest first.
    pub fn entries(&self) -> Vec<SyncLogEntry> {
        self.entries.read().clone()
    }
}

impl LogSink for MemoryLogSink {
    fn append(&self, entry: NewLogEntry) -> SyncResult<LogId> {
        let mut entries = self.entries.write();
        let id = entries.last().map_or(1, |last| last.id + 1);
        entries.push(entry.into_entry(id, Utc::now()));
        Ok(id)
    }

    fn list(&self, job_id: JobId, limit: usize, offset: usize) -> SyncResult<Vec<SyncLogEntry>> {
        Ok(self
            .entries
            .read()
            .iter()
            .rev()
            .filter(|e| e.job_id == job_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}
