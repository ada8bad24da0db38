//! JSON-file backed stores.
//!
//! Documents are replaced atomically: the new contents are written to a
//! temporary file in the same directory and then renamed over the target,
//! so a crash never leaves a half-written document behind.

use crate::destination::{
    DestinationRow, DestinationStore, DestinationTxn, UpsertOutcome, UpsertWrite,
};
use crate::error::{StoreError, StoreResult};
use crate::memory::{MemoryDestinationStore, MemorySourceStore, MemoryTxn, SourceSnapshot};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Reads a JSON document. Returns `None` if the file does not exist.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid JSON for `T`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let value = serde_json::from_reader(BufReader::new(file))?;
    Ok(Some(value))
}

/// Atomically replaces `path` with the JSON encoding of `value`.
///
/// # Errors
///
/// Returns an error if the parent directory is missing or any write fails.
/// On error the previous contents of `path` are left intact.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// Loads a source snapshot document into a [`MemorySourceStore`].
///
/// # Errors
///
/// Returns an error if the file is missing or malformed.
pub fn load_source_snapshot(path: &Path) -> StoreResult<MemorySourceStore> {
    let snapshot: SourceSnapshot = read_json(path)?.ok_or_else(|| {
        StoreError::Io(std::io::Error::new(
            ErrorKind::NotFound,
            format!("source snapshot not found: {}", path.display()),
        ))
    })?;
    debug!(
        path = %path.display(),
        employees = snapshot.employees.len(),
        employments = snapshot.employments.len(),
        "Loaded source snapshot"
    );
    Ok(MemorySourceStore::from_snapshot(snapshot))
}

/// A destination store persisted as a JSON array of rows.
///
/// The document is rewritten on every commit. A failed rewrite fails the
/// commit and leaves both the file and the in-memory rows unchanged.
#[derive(Debug)]
pub struct FileDestinationStore {
    path: PathBuf,
    inner: MemoryDestinationStore,
}

impl FileDestinationStore {
    /// Opens the store at `path`, creating an empty one if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or decoded, or
    /// holds two rows with the same natural key.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let rows: Vec<DestinationRow> = read_json(path)?.unwrap_or_default();
        let count = rows.len();
        let inner = MemoryDestinationStore::with_rows(rows);
        if inner.row_count()? as usize != count {
            return Err(StoreError::Corrupted(format!(
                "duplicate natural keys in {}",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    /// Returns the document path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a copy of every committed row.
    pub fn rows(&self) -> Vec<DestinationRow> {
        self.inner.rows()
    }
}

impl DestinationStore for FileDestinationStore {
    fn begin(&self) -> StoreResult<Box<dyn DestinationTxn + '_>> {
        Ok(Box::new(FileTxn {
            inner: self.inner.begin_memory()?,
            path: &self.path,
        }))
    }

    fn row(&self, erp_code: &str) -> StoreResult<Option<DestinationRow>> {
        self.inner.row(erp_code)
    }

    fn row_count(&self) -> StoreResult<u64> {
        self.inner.row_count()
    }
}

struct FileTxn<'a> {
    inner: MemoryTxn<'a>,
    path: &'a Path,
}

impl DestinationTxn for FileTxn<'_> {
    fn upsert(&mut self, write: &UpsertWrite) -> StoreResult<UpsertOutcome> {
        self.inner.upsert(write)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let path = self.path;
        let staged = self.inner.staged_len();
        self.inner.commit_with(|rows| {
            let rows: Vec<&DestinationRow> = rows.values().collect();
            write_json_atomic(path, &rows)
                .map_err(|e| StoreError::Transaction(format!("commit failed: {e}")))
        })?;
        debug!(path = %path.display(), staged, "Committed destination rows");
        Ok(())
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
