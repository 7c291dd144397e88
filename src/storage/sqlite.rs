//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{FailedRequestRecord, RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;

/// Key under which the processed id set is stored in `key_value`
pub const PROCESSED_IDS_KEY: &str = "processedIds";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Failed),
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;

        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    // ===== Checkpoint State =====

    fn load_processed_ids(&self) -> StorageResult<Vec<String>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM key_value WHERE key = ?1",
                params![PROCESSED_IDS_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn clear_processed_ids(&mut self) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM key_value WHERE key = ?1",
            params![PROCESSED_IDS_KEY],
        )?;
        Ok(())
    }

    fn load_stats(&self, run_id: i64) -> StorageResult<BTreeMap<String, u64>> {
        let json: String = self
            .conn
            .query_row(
                "SELECT stats FROM runs WHERE id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))?;

        Ok(serde_json::from_str(&json)?)
    }

    fn save_checkpoint(
        &mut self,
        run_id: i64,
        stats: &BTreeMap<String, u64>,
        processed_ids: &[String],
    ) -> StorageResult<()> {
        let stats_json = serde_json::to_string(stats)?;
        let ids_json = serde_json::to_string(processed_ids)?;
        let now = Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE runs SET stats = ?1 WHERE id = ?2",
            params![stats_json, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        tx.execute(
            "INSERT INTO key_value (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![PROCESSED_IDS_KEY, ids_json, now],
        )?;
        tx.commit()?;

        Ok(())
    }

    // ===== Failed Requests =====

    fn record_failed_request(
        &mut self,
        run_id: i64,
        url: &str,
        label: &str,
        error: &str,
        attempts: u32,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO failed_requests (run_id, url, label, error, attempts, failed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![run_id, url, label, error, attempts, now],
        )?;
        Ok(())
    }

    fn get_failed_requests(&self, run_id: i64) -> StorageResult<Vec<FailedRequestRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, url, label, error, attempts, failed_at
             FROM failed_requests WHERE run_id = ?1 ORDER BY id",
        )?;

        let failed = stmt
            .query_map(params![run_id], |row| {
                Ok(FailedRequestRecord {
                    run_id: row.get(0)?,
                    url: row.get(1)?,
                    label: row.get(2)?,
                    error: row.get(3)?,
                    attempts: row.get(4)?,
                    failed_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(products: u64, duplicates: u64) -> BTreeMap<String, u64> {
        let mut stats = BTreeMap::new();
        stats.insert("products".to_string(), products);
        stats.insert("duplicates".to_string(), duplicates);
        stats
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteStorage::new_in_memory().is_ok());
    }

    #[test]
    fn test_create_and_finish_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("test_hash").unwrap();
        assert!(run_id > 0);

        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());

        storage.finish_run(run_id, RunStatus::Completed).unwrap();
        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_get_missing_run() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.get_run(42),
            Err(StorageError::RunNotFound(42))
        ));
        assert!(storage.get_latest_run().unwrap().is_none());
    }

    #[test]
    fn test_fresh_database_has_no_processed_ids() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.load_processed_ids().unwrap().is_empty());
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("test_hash").unwrap();
        assert_eq!(storage.load_stats(run_id).unwrap(), BTreeMap::new());

        let ids = vec!["A".to_string(), "B".to_string()];
        storage.save_checkpoint(run_id, &stats(2, 0), &ids).unwrap();
        storage
            .save_checkpoint(
                run_id,
                &stats(3, 1),
                &["A".to_string(), "B".to_string(), "C".to_string()],
            )
            .unwrap();

        assert_eq!(storage.load_stats(run_id).unwrap(), stats(3, 1));
        assert_eq!(storage.load_processed_ids().unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_stats_are_per_run_ids_are_global() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let first = storage.create_run("h").unwrap();
        storage
            .save_checkpoint(first, &stats(5, 0), &["A".to_string()])
            .unwrap();

        let second = storage.create_run("h").unwrap();
        assert!(storage.load_stats(second).unwrap().is_empty());
        assert_eq!(storage.load_processed_ids().unwrap(), vec!["A"]);
    }

    #[test]
    fn test_checkpoint_for_missing_run_writes_nothing() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = storage.save_checkpoint(99, &stats(1, 0), &["A".to_string()]);

        assert!(matches!(result, Err(StorageError::RunNotFound(99))));
        assert!(storage.load_processed_ids().unwrap().is_empty());
    }

    #[test]
    fn test_clear_processed_ids() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("h").unwrap();
        storage
            .save_checkpoint(run_id, &stats(1, 0), &["A".to_string()])
            .unwrap();

        storage.clear_processed_ids().unwrap();
        assert!(storage.load_processed_ids().unwrap().is_empty());
    }

    #[test]
    fn test_failed_requests() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("h").unwrap();

        storage
            .record_failed_request(run_id, "https://e.com/a", "category", "HTTP 503", 5)
            .unwrap();

        let failed = storage.get_failed_requests(run_id).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].url, "https://e.com/a");
        assert_eq!(failed[0].attempts, 5);
        assert!(storage.get_failed_requests(run_id + 1).unwrap().is_empty());
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl.db");

        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            let run_id = storage.create_run("h").unwrap();
            storage
                .save_checkpoint(run_id, &stats(1, 0), &["A".to_string()])
                .unwrap();
        }

        let storage = SqliteStorage::new(&path).unwrap();
        assert_eq!(storage.load_processed_ids().unwrap(), vec!["A"]);
    }
}
