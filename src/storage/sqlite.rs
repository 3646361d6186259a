//! SQLite snapshot backend
//!
//! Staging writes the whole candidate snapshot into `staging_records`.
//! Committing replaces `snapshot_records` with the staged rows in a single
//! transaction, so a reader sees either the previous snapshot or the new one.

use crate::model::{Attributes, Record};
use crate::storage::schema::initialize_schema;
use crate::storage::{Snapshot, SnapshotStore, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// SQLite snapshot backend
pub struct SqliteSnapshotStore {
    conn: Arc<Mutex<Connection>>,
    location: PathBuf,
}

/// Rows staged in `staging_records`
///
/// Dropping an uncommitted handle clears the staging tables.
pub struct SqliteStaging {
    conn: Arc<Mutex<Connection>>,
    committed: bool,
}

impl Drop for SqliteStaging {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = clear_staging(&conn) {
            tracing::warn!("Failed to discard staged snapshot: {}", e);
        }
    }
}

impl SqliteSnapshotStore {
    /// Opens or creates the database at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        // Leftovers from a run that died between staging and commit
        clear_staging(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: path.to_path_buf(),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: PathBuf::from(":memory:"),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Number of rows currently staged
    #[cfg(test)]
    fn staged_rows(&self) -> StorageResult<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM staging_records", [], |row| {
            row.get(0)
        })?)
    }
}

fn clear_staging(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        DELETE FROM staging_records;
        DELETE FROM staging_meta;
    ",
    )
}

/// Raw column values of one record row
type RecordRow = (String, String, String, String);

fn decode_record(row: RecordRow) -> StorageResult<Record> {
    let (key, source_url, fetched_at, attributes) = row;

    let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
        .map_err(|e| StorageError::Corrupt(format!("record {}: bad fetched_at: {}", key, e)))?
        .with_timezone(&Utc);
    let attributes: Attributes = serde_json::from_str(&attributes)
        .map_err(|e| StorageError::Corrupt(format!("record {}: bad attributes: {}", key, e)))?;

    Ok(Record {
        key,
        source_url,
        fetched_at,
        attributes,
    })
}

impl SnapshotStore for SqliteSnapshotStore {
    type Staging = SqliteStaging;

    fn load_snapshot(&self) -> StorageResult<Snapshot> {
        let conn = self.lock()?;

        let updated_at: Option<String> = conn
            .query_row(
                "SELECT updated_at FROM snapshot_meta WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        let mut stmt = conn.prepare(
            "SELECT key, source_url, fetched_at, attributes
             FROM snapshot_records ORDER BY position ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<RecordRow>, _>>()?;

        let records = rows
            .into_iter()
            .map(decode_record)
            .collect::<StorageResult<Vec<_>>>()?;

        let updated_at = match updated_at {
            Some(text) => Some(
                DateTime::parse_from_rfc3339(&text)
                    .map_err(|e| StorageError::Corrupt(format!("bad updated_at: {}", e)))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(Snapshot {
            updated_at,
            records,
        })
    }

    fn write_staging(&self, snapshot: &Snapshot) -> StorageResult<SqliteStaging> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM staging_records", [])?;
        tx.execute("DELETE FROM staging_meta", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO staging_records (position, key, source_url, fetched_at, attributes)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, record) in snapshot.records.iter().enumerate() {
                let attributes = serde_json::to_string(&record.attributes)?;
                insert.execute(params![
                    position as i64,
                    record.key,
                    record.source_url,
                    record.fetched_at.to_rfc3339(),
                    attributes,
                ])?;
            }
        }
        tx.execute(
            "INSERT INTO staging_meta (id, updated_at) VALUES (1, ?1)",
            params![snapshot.updated_at.map(|t| t.to_rfc3339())],
        )?;
        tx.commit()?;

        tracing::trace!("Staged {} records in {}", snapshot.len(), self.describe());

        Ok(SqliteStaging {
            conn: Arc::clone(&self.conn),
            committed: false,
        })
    }

    fn commit_staging(&self, mut staging: SqliteStaging) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute_batch(
            "
            DELETE FROM snapshot_records;
            DELETE FROM snapshot_meta;
            INSERT INTO snapshot_records (position, key, source_url, fetched_at, attributes)
                SELECT position, key, source_url, fetched_at, attributes FROM staging_records;
            INSERT INTO snapshot_meta (id, updated_at)
                SELECT id, updated_at FROM staging_meta;
            DELETE FROM staging_records;
            DELETE FROM staging_meta;
        ",
        )?;
        tx.commit()?;

        staging.committed = true;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.location.display())
    }
}
