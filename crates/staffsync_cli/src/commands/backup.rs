//! Pre-sync backups of the destination document.
//!
//! Each backup is a full copy of `destination.json` written to the backup
//! directory as `<tag>-<timestamp>.json`. The copy goes through the same
//! temp-file-and-rename path as the live document.

use chrono::Utc;
use staffsync_engine::{BackupReceipt, BackupService, CollaboratorError, CollaboratorResult};
use staffsync_store::{read_json, write_json_atomic, DestinationRow};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const SERVICE: &str = "backup";

/// Backup service that snapshots the destination document.
#[derive(Debug, Clone)]
pub struct SnapshotBackup {
    destination: PathBuf,
    dir: PathBuf,
}

impl SnapshotBackup {
    /// Creates a service copying `destination` into `dir`.
    pub fn new(destination: &Path, dir: &Path) -> Self {
        Self {
            destination: destination.to_path_buf(),
            dir: dir.to_path_buf(),
        }
    }
}

impl BackupService for SnapshotBackup {
    fn create_backup(&self, tag: &str, initiator: &str) -> CollaboratorResult<BackupReceipt> {
        let fail = |e: &dyn std::fmt::Display| CollaboratorError::new(SERVICE, e.to_string());

        fs::create_dir_all(&self.dir).map_err(|e| fail(&e))?;

        let rows: Vec<DestinationRow> = read_json(&self.destination)
            .map_err(|e| fail(&e))?
            .unwrap_or_default();

        let created_at = Utc::now();
        let name = format!("{tag}-{}.json", created_at.format("%Y%m%dT%H%M%S%.3fZ"));
        let path = self.dir.join(&name);
        write_json_atomic(&path, &rows).map_err(|e| fail(&e))?;

        info!(
            path = %path.display(),
            rows = rows.len(),
            initiator,
            "Destination backup written"
        );
        Ok(BackupReceipt {
            id: name,
            created_at,
        })
    }
}
