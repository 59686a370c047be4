//! Thread store trait and the file-backed implementation.
//!
//! A store persists the `user_id -> thread_id` mapping across restarts.
//! The registry keeps the authoritative copy in memory; stores only need
//! durable point writes and a full load at startup.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::threads::sqlite::SqliteThreadStore;

/// Errors from thread store operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("database error: {0}")]
    Database(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// One persisted user -> thread mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub thread_id: String,
    /// Timestamp when the mapping was created (Unix ms)
    pub created_at: i64,
    /// Timestamp when the mapping was last written (Unix ms)
    pub updated_at: i64,
}

impl ThreadRecord {
    pub fn new(thread_id: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            thread_id: thread_id.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Current time in Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Durable backing store for the thread registry.
pub trait ThreadStore: Send + Sync {
    fn get(&self, user_id: i64) -> Result<Option<ThreadRecord>, StoreError>;
    fn put(&self, user_id: i64, record: &ThreadRecord) -> Result<(), StoreError>;
    fn delete(&self, user_id: i64) -> Result<bool, StoreError>;
    fn count(&self) -> Result<usize, StoreError>;
    /// Load every mapping, used to warm the registry cache at startup.
    fn load_all(&self) -> Result<HashMap<i64, ThreadRecord>, StoreError>;
    /// Short human-readable backend name, logged at startup.
    fn backend_name(&self) -> &'static str;
}

/// JSON-file thread store.
///
/// The whole mapping is rewritten on every mutation via a temp file and
/// rename, so a crash mid-write never leaves a truncated file behind.
#[derive(Debug)]
pub struct FileThreadStore {
    path: PathBuf,
}

impl FileThreadStore {
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    fn read_map(&self) -> Result<HashMap<i64, ThreadRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        // JSON object keys are strings; user ids are stored as decimal text.
        let raw: HashMap<String, ThreadRecord> = serde_json::from_str(&content)?;
        let mut map = HashMap::with_capacity(raw.len());
        for (key, record) in raw {
            let user_id = key
                .parse::<i64>()
                .map_err(|e| StoreError::Serialization(format!("bad user id {key:?}: {e}")))?;
            map.insert(user_id, record);
        }
        Ok(map)
    }

    fn write_map(&self, map: &HashMap<i64, ThreadRecord>) -> Result<(), StoreError> {
        let raw: HashMap<String, &ThreadRecord> = map
            .iter()
            .map(|(user_id, record)| (user_id.to_string(), record))
            .collect();
        let content = serde_json::to_string_pretty(&raw)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ThreadStore for FileThreadStore {
    fn get(&self, user_id: i64) -> Result<Option<ThreadRecord>, StoreError> {
        Ok(self.read_map()?.remove(&user_id))
    }

    fn put(&self, user_id: i64, record: &ThreadRecord) -> Result<(), StoreError> {
        let mut map = self.read_map()?;
        map.insert(user_id, record.clone());
        self.write_map(&map)
    }

    fn delete(&self, user_id: i64) -> Result<bool, StoreError> {
        let mut map = self.read_map()?;
        let existed = map.remove(&user_id).is_some();
        if existed {
            self.write_map(&map)?;
        }
        Ok(existed)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.read_map()?.len())
    }

    fn load_all(&self) -> Result<HashMap<i64, ThreadRecord>, StoreError> {
        self.read_map()
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

/// Open the preferred SQLite store, degrading to the JSON file store when
/// SQLite is unavailable. Store selection never fails startup.
pub fn open_store(db_path: &Path, state_dir: &Path) -> Box<dyn ThreadStore> {
    match SqliteThreadStore::open(db_path) {
        Ok(store) => Box::new(store),
        Err(e) => {
            tracing::warn!(
                "thread database unavailable, falling back to file store: {e}"
            );
            let file_path = state_dir.join("threads.json");
            match FileThreadStore::open(file_path.clone()) {
                Ok(store) => Box::new(store),
                Err(e) => {
                    // Last resort: a file store pointed at the path anyway;
                    // writes will fail and be logged, lookups stay in memory.
                    tracing::error!("file store init failed: {e}");
                    Box::new(FileThreadStore { path: file_path })
                }
            }
        }
    }
}
