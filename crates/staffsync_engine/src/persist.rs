//! File-backed job store and log sink.
//!
//! Jobs are kept in one JSON document that is replaced atomically on every
//! change. Log entries are appended to a JSON-lines file and read back by
//! streaming it.

use crate::error::SyncResult;
use crate::job::{JobId, NewJob, SyncJob};
use crate::job_store::{JobStore, MemoryJobStore};
use crate::log::{LogId, LogSink, NewLogEntry, SyncLogEntry};
use chrono::Utc;
use parking_lot::Mutex;
use staffsync_store::{read_json, write_json_atomic, StoreError};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A job store persisted as a JSON array.
#[derive(Debug)]
pub struct JsonJobStore {
    path: PathBuf,
    inner: MemoryJobStore,
}

impl JsonJobStore {
    /// Opens the store at `path`, starting empty if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or decoded.
    pub fn open(path: &Path) -> SyncResult<Self> {
        let jobs: Vec<SyncJob> = read_json(path)?.unwrap_or_default();
        debug!(path = %path.display(), jobs = jobs.len(), "Opened job store");
        Ok(Self {
            path: path.to_path_buf(),
            inner: MemoryJobStore::with_jobs(jobs),
        })
    }

    fn persist(&self, jobs: &std::collections::BTreeMap<JobId, SyncJob>) -> SyncResult<()> {
        let jobs: Vec<&SyncJob> = jobs.values().collect();
        write_json_atomic(&self.path, &jobs)?;
        Ok(())
    }
}

impl JobStore for JsonJobStore {
    fn insert(&self, job: NewJob) -> SyncResult<SyncJob> {
        self.inner.insert_with(job, |jobs| self.persist(jobs))
    }

    fn get(&self, id: JobId) -> SyncResult<Option<SyncJob>> {
        self.inner.get(id)
    }

    fn save(&self, job: &SyncJob) -> SyncResult<()> {
        self.inner.save_with(job, |jobs| self.persist(jobs))
    }

    fn list(&self, limit: usize, offset: usize) -> SyncResult<Vec<SyncJob>> {
        self.inner.list(limit, offset)
    }
}

/// A log sink appending one JSON object per line.
///
/// Only the next id is kept in memory. Listing streams the file.
#[derive(Debug)]
pub struct JsonLogSink {
    path: PathBuf,
    file: Mutex<LogFile>,
}

#[derive(Debug)]
struct LogFile {
    /// Opened on the first append.
    writer: Option<BufWriter<File>>,
    next_id: LogId,
    /// Length of the file up to the last complete line.
    valid_len: u64,
}

impl JsonLogSink {
    /// Opens the sink at `path`, scanning any existing entries for the
    /// last id.
    ///
    /// A partial last line left by an interrupted append is ignored and
    /// trimmed before the next append.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or holds a
    /// malformed complete line.
    pub fn open(path: &Path) -> SyncResult<Self> {
        let mut last_id = 0;
        let mut valid_len = 0;
        let mut entries = 0usize;
        scan_lines(path, |offset, line| {
            let entry = parse_line(path, offset, line)?;
            last_id = last_id.max(entry.id);
            valid_len = offset + line.len() as u64;
            entries += 1;
            Ok(())
        })?;
        debug!(path = %path.display(), entries, last_id, "Opened log sink");

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(LogFile {
                writer: None,
                next_id: last_id + 1,
                valid_len,
            }),
        })
    }

    fn open_writer(&self, valid_len: u64) -> SyncResult<BufWriter<File>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(StoreError::from)?;
        let len = file.metadata().map_err(StoreError::from)?.len();
        if len > valid_len {
            warn!(
                path = %self.path.display(),
                trimmed = len - valid_len,
                "Trimming partial log line"
            );
            file.set_len(valid_len).map_err(StoreError::from)?;
        }
        Ok(BufWriter::new(file))
    }
}

/// Calls `f` with the byte offset and bytes of every complete non-blank
/// line. A missing file has no lines.
fn scan_lines(
    path: &Path,
    mut f: impl FnMut(u64, &[u8]) -> SyncResult<()>,
) -> SyncResult<()> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StoreError::from(e).into()),
    };
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let mut offset = 0u64;
    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(StoreError::from)?;
        if read == 0 || line.last() != Some(&b'\n') {
            return Ok(());
        }
        if !line.trim_ascii().is_empty() {
            f(offset, &line)?;
        }
        offset += read as u64;
    }
}

fn parse_line(path: &Path, offset: u64, line: &[u8]) -> SyncResult<SyncLogEntry> {
    serde_json::from_slice(line).map_err(|e| {
        StoreError::Corrupted(format!(
            "{}: bad log line at byte {offset}: {e}",
            path.display()
        ))
        .into()
    })
}

impl LogSink for JsonLogSink {
    fn append(&self, entry: NewLogEntry) -> SyncResult<LogId> {
        let mut file = self.file.lock();
        let id = file.next_id;
        let mut line = serde_json::to_vec(&entry.into_entry(id, Utc::now()))
            .map_err(StoreError::from)?;
        line.push(b'\n');

        if file.writer.is_none() {
            let writer = self.open_writer(file.valid_len)?;
            file.writer = Some(writer);
        }
        let written = match file.writer.as_mut() {
            Some(writer) => writer.write_all(&line).and_then(|()| writer.flush()),
            None => Ok(()),
        };
        if let Err(e) = written {
            // Drop the buffer unflushed; the next append trims the file.
            if let Some(writer) = file.writer.take() {
                let _ = writer.into_parts();
            }
            return Err(StoreError::from(e).into());
        }

        file.valid_len += line.len() as u64;
        file.next_id += 1;
        Ok(id)
    }

    fn list(&self, job_id: JobId, limit: usize, offset: usize) -> SyncResult<Vec<SyncLogEntry>> {
        let window = offset.saturating_add(limit);
        if window == 0 {
            return Ok(Vec::new());
        }
        let mut newest = VecDeque::new();
        scan_lines(&self.path, |at, line| {
            let entry = parse_line(&self.path, at, line)?;
            if entry.job_id == job_id {
                if newest.len() == window {
                    newest.pop_front();
                }
                newest.push_back(entry);
            }
            Ok(())
        })?;
        Ok(newest.into_iter().rev().skip(offset).take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfiguration;
    use crate::job::{JobKind, JobStatus};
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn jobs_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.json");

        let store = JsonJobStore::open(&path).unwrap();
        let mut job = store
            .insert(NewJob {
                name: "Manual Sync".into(),
                kind: JobKind::Manual,
                initiator: "u1".into(),
                config: RunConfiguration::default().with_batch_size(250),
            })
            .unwrap();
        job.transition(JobStatus::Running, Utc::now()).unwrap();
        store.save(&job).unwrap();

        let reopened = JsonJobStore::open(&path).unwrap();
        let loaded = reopened.get(job.id).unwrap().unwrap();
        assert_eq!(loaded, job);
        assert_eq!(loaded.config.batch_size, 250);

        let next = reopened
            .insert(NewJob {
                name: "Manual Sync".into(),
                kind: JobKind::Manual,
                initiator: "u1".into(),
                config: RunConfiguration::default(),
            })
            .unwrap();
        assert_eq!(next.id, job.id + 1);
    }

    #[test]
    fn log_lines_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs.jsonl");

        let sink = JsonLogSink::open(&path).unwrap();
        sink.append(NewLogEntry::info(1, "Employee E001 synced successfully").with_key("E001"))
            .unwrap();
        sink.append(NewLogEntry::error(1, "Failed to sync employee E002: First name is required"))
            .unwrap();

        let reopened = JsonLogSink::open(&path).unwrap();
        let entries = reopened.list(1, 10, 0).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].message.starts_with("Failed"));

        let id = reopened.append(NewLogEntry::debug(1, "after reopen")).unwrap();
        assert_eq!(id, 3);
    }

    #[test]
    fn failed_write_is_not_published() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("logs.jsonl");

        let sink = JsonLogSink::open(&path).unwrap();
        assert!(sink.append(NewLogEntry::info(1, "lost")).is_err());
        assert!(sink.list(1, 10, 0).unwrap().is_empty());

        std::fs::create_dir(path.parent().unwrap()).unwrap();
        assert_eq!(sink.append(NewLogEntry::info(1, "kept")).unwrap(), 1);
    }

    #[test]
    fn list_reads_entries_from_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs.jsonl");

        let reader = JsonLogSink::open(&path).unwrap();
        let writer = JsonLogSink::open(&path).unwrap();
        writer.append(NewLogEntry::info(4, "written elsewhere")).unwrap();

        let entries = reader.list(4, 10, 0).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "written elsewhere");
    }

    #[test]
    fn paging_is_newest_first_per_job() {
        let dir = TempDir::new().unwrap();
        let sink = JsonLogSink::open(&dir.path().join("logs.jsonl")).unwrap();
        for i in 1..=5 {
            sink.append(NewLogEntry::info(1, format!("job1 #{i}"))).unwrap();
            sink.append(NewLogEntry::info(2, format!("job2 #{i}"))).unwrap();
        }

        let page: Vec<_> = sink
            .list(1, 2, 1)
            .unwrap()
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(page, vec!["job1 #4", "job1 #3"]);
        assert_eq!(sink.list(2, 10, 0).unwrap().len(), 5);
        assert!(sink.list(1, 10, 5).unwrap().is_empty());
        assert!(sink.list(1, 0, 0).unwrap().is_empty());
    }

    #[test]
    fn partial_last_line_is_trimmed_before_next_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs.jsonl");
        {
            let sink = JsonLogSink::open(&path).unwrap();
            sink.append(NewLogEntry::info(1, "one")).unwrap();
            sink.append(NewLogEntry::info(1, "two")).unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"id":3,"job_id":1,"lev"#).unwrap();
        drop(file);

        let sink = JsonLogSink::open(&path).unwrap();
        assert_eq!(sink.list(1, 10, 0).unwrap().len(), 2);
        assert_eq!(sink.append(NewLogEntry::info(1, "three")).unwrap(), 3);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        for line in text.lines() {
            serde_json::from_str::<SyncLogEntry>(line).unwrap();
        }
        let messages: Vec<_> = sink
            .list(1, 10, 0)
            .unwrap()
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages, vec!["three", "two", "one"]);
    }

    #[test]
    fn malformed_complete_line_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs.jsonl");
        std::fs::write(&path, "not json\n").unwrap();

        let err = JsonLogSink::open(&path).unwrap_err();
        assert!(err.to_string().contains("bad log line at byte 0"));
    }
}
