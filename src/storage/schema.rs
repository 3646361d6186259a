//! Database schema definitions
//!
//! The committed snapshot and the staged candidate live in parallel tables.
//! A commit swaps the staged rows into the snapshot tables inside one
//! transaction.

/// SQL schema for the snapshot database
pub const SCHEMA_SQL: &str = r#"
-- Committed snapshot, in commit order
CREATE TABLE IF NOT EXISTS snapshot_records (
    position INTEGER PRIMARY KEY,
    key TEXT NOT NULL,
    source_url TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    attributes TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshot_records_key ON snapshot_records(key);

CREATE TABLE IF NOT EXISTS snapshot_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    updated_at TEXT
);

-- Candidate snapshot written by a flush before it is committed
CREATE TABLE IF NOT EXISTS staging_records (
    position INTEGER PRIMARY KEY,
    key TEXT NOT NULL,
    source_url TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    attributes TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS staging_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    updated_at TEXT
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        let result = initialize_schema(&conn);

        assert!(result.is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let tables = vec![
            "snapshot_records",
            "snapshot_meta",
            "staging_records",
            "staging_meta",
        ];

        for table in tables {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
