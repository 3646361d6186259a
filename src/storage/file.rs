//! JSON file snapshot backend
//!
//! The snapshot lives in a single JSON document. A flush writes the complete
//! candidate document to a temp file in the same directory, syncs it, and
//! renames it over the target. A rename within one directory is a single-step
//! substitution, so readers see either the old file or the new one.

use crate::storage::{Snapshot, SnapshotStore, StorageError, StorageResult};
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempPath};

/// Snapshot stored as one JSON document
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

/// A staged snapshot file; removed on drop unless committed
#[derive(Debug)]
pub struct FileStaging {
    temp: TempPath,
}

impl FileStaging {
    /// Location of the staged file
    pub fn path(&self) -> &Path {
        &self.temp
    }
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory that holds both the snapshot and its staging files
    fn directory(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl SnapshotStore for JsonFileStore {
    type Staging = FileStaging;

    fn load_snapshot(&self) -> StorageResult<Snapshot> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Snapshot::default()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::Corrupt(format!("{}: {}", self.path.display(), e))
        })
    }

    fn write_staging(&self, snapshot: &Snapshot) -> StorageResult<FileStaging> {
        let directory = self.directory();
        fs::create_dir_all(&directory)?;

        let mut temp = Builder::new()
            .prefix(".snapshot-")
            .suffix(".staging")
            .tempfile_in(&directory)?;

        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, snapshot)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;

        tracing::trace!(
            "Staged {} records at {}",
            snapshot.len(),
            temp.path().display()
        );

        Ok(FileStaging {
            temp: temp.into_temp_path(),
        })
    }

    fn commit_staging(&self, staging: FileStaging) -> StorageResult<()> {
        // On failure the error carries the temp path back and dropping it removes the file
        staging
            .temp
            .persist(&self.path)
            .map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}
