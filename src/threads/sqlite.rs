//! SQLite-backed thread store.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::threads::store::{StoreError, ThreadRecord, ThreadStore};

/// Relational thread store. The connection sits behind a mutex because
/// `rusqlite::Connection` is not `Sync`; all access in-process is brief
/// point reads and writes.
pub struct SqliteThreadStore {
    conn: Mutex<Connection>,
}

impl SqliteThreadStore {
    /// Open (or create) the database at `path` and ensure the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS user_threads (
                user_id    INTEGER PRIMARY KEY,
                thread_id  TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(err: rusqlite::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

fn map_row(row: &rusqlite::Row<'_>) -> Result<ThreadRecord, rusqlite::Error> {
    Ok(ThreadRecord {
        thread_id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
    })
}

impl ThreadStore for SqliteThreadStore {
    fn get(&self, user_id: i64) -> Result<Option<ThreadRecord>, StoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT thread_id, created_at, updated_at FROM user_threads WHERE user_id = ?1",
            params![user_id],
            map_row,
        )
        .optional()
        .map_err(db_err)
    }

    fn put(&self, user_id: i64, record: &ThreadRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO user_threads (user_id, thread_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                thread_id = excluded.thread_id,
                updated_at = excluded.updated_at",
            params![
                user_id,
                record.thread_id,
                record.created_at,
                record.updated_at
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn delete(&self, user_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let affected = conn
            .execute(
                "DELETE FROM user_threads WHERE user_id = ?1",
                params![user_id],
            )
            .map_err(db_err)?;
        Ok(affected > 0)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM user_threads", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count as usize)
    }

    fn load_all(&self) -> Result<HashMap<i64, ThreadRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT user_id, thread_id, created_at, updated_at FROM user_threads")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    ThreadRecord {
                        thread_id: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                    },
                ))
            })
            .map_err(db_err)?;

        let mut map = HashMap::new();
        for row in rows {
            let (user_id, record) = row.map_err(db_err)?;
            map.insert(user_id, record);
        }
        Ok(map)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_roundtrip() {
        let store = SqliteThreadStore::open_in_memory().unwrap();

        let record = ThreadRecord::new("thread_abc");
        store.put(42, &record).unwrap();

        let loaded = store.get(42).unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(store.get(43).unwrap().is_none());
    }

    #[test]
    fn test_put_replaces_existing() {
        let store = SqliteThreadStore::open_in_memory().unwrap();

        store.put(1, &ThreadRecord::new("old")).unwrap();
        store.put(1, &ThreadRecord::new("new")).unwrap();

        assert_eq!(store.get(1).unwrap().unwrap().thread_id, "new");
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_delete_reports_existence() {
        let store = SqliteThreadStore::open_in_memory().unwrap();

        store.put(7, &ThreadRecord::new("t")).unwrap();
        assert!(store.delete(7).unwrap());
        assert!(!store.delete(7).unwrap());
    }

    #[test]
    fn test_load_all() {
        let store = SqliteThreadStore::open_in_memory().unwrap();

        store.put(1, &ThreadRecord::new("t1")).unwrap();
        store.put(2, &ThreadRecord::new("t2")).unwrap();

        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[&2].thread_id, "t2");
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("threads.db");

        {
            let store = SqliteThreadStore::open(&path).unwrap();
            store.put(9, &ThreadRecord::new("persisted")).unwrap();
        }

        let store = SqliteThreadStore::open(&path).unwrap();
        assert_eq!(store.get(9).unwrap().unwrap().thread_id, "persisted");
    }
}
