//! Thread registry
//!
//! Owns the `user_id -> thread_id` mapping that gives each user a durable
//! conversation context. Threads are created lazily on first contact,
//! replaced only through an explicit reset, and persisted through a
//! pluggable store. The in-memory map is authoritative for the lifetime
//! of the process; the store is warmed from at startup and written through
//! on every mutation.

pub mod sqlite;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info};

use crate::assistant::backend::AssistantBackend;
use crate::threads::store::{ThreadRecord, ThreadStore};

/// Errors from thread registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to create conversation thread: {0}")]
    ThreadCreation(String),
}

/// Read-only registry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_threads: usize,
    pub active_users: usize,
}

/// Maps users to their assistant conversation threads.
pub struct ThreadRegistry {
    backend: Arc<dyn AssistantBackend>,
    store: Box<dyn ThreadStore>,
    threads: RwLock<HashMap<i64, ThreadRecord>>,
}

impl ThreadRegistry {
    /// Build a registry over the given backend and store, warming the
    /// in-memory map from the store. A store that cannot be read starts
    /// the registry empty rather than failing startup.
    pub fn new(backend: Arc<dyn AssistantBackend>, store: Box<dyn ThreadStore>) -> Self {
        let threads = match store.load_all() {
            Ok(map) => {
                info!(
                    backend = store.backend_name(),
                    count = map.len(),
                    "thread store loaded"
                );
                map
            }
            Err(e) => {
                error!("failed to load thread store, starting fresh: {e}");
                HashMap::new()
            }
        };
        Self {
            backend,
            store,
            threads: RwLock::new(threads),
        }
    }

    /// Return the user's thread id, creating and persisting a new thread
    /// on first contact.
    ///
    /// A persistence failure after creation is logged but does not roll
    /// back the in-memory mapping; the id stays authoritative for the
    /// rest of the process lifetime.
    pub async fn get_or_create(&self, user_id: i64) -> Result<String, RegistryError> {
        if let Some(record) = self.threads.read().get(&user_id) {
            debug!(user_id, thread_id = %record.thread_id, "using existing thread");
            return Ok(record.thread_id.clone());
        }

        let thread_id = self
            .backend
            .create_thread()
            .await
            .map_err(|e| RegistryError::ThreadCreation(e.to_string()))?;

        let record = ThreadRecord::new(thread_id.clone());
        self.threads.write().insert(user_id, record.clone());

        if let Err(e) = self.store.put(user_id, &record) {
            error!(user_id, "failed to persist thread mapping: {e}");
        }

        info!(user_id, thread_id = %thread_id, "created new thread");
        Ok(thread_id)
    }

    /// Remove the user's thread mapping. Returns whether one existed; the
    /// next `get_or_create` issues a brand-new thread with no memory of
    /// prior exchanges.
    pub fn clear(&self, user_id: i64) -> bool {
        let existed = self.threads.write().remove(&user_id).is_some();
        if existed {
            if let Err(e) = self.store.delete(user_id) {
                error!(user_id, "failed to delete persisted thread mapping: {e}");
            }
            info!(user_id, "cleared thread");
        }
        existed
    }

    /// Counters over the in-memory mapping.
    pub fn stats(&self) -> RegistryStats {
        let count = self.threads.read().len();
        RegistryStats {
            total_threads: count,
            active_users: count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::backend::{BackendError, RunState, ThreadMessage};
    use crate::threads::store::FileThreadStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Backend that issues sequential thread ids, or fails on demand.
    #[derive(Default)]
    struct CountingBackend {
        created: Mutex<u32>,
        fail_creation: bool,
    }

    #[async_trait]
    impl AssistantBackend for CountingBackend {
        async fn create_thread(&self) -> Result<String, BackendError> {
            if self.fail_creation {
                return Err(BackendError::Api {
                    status: 500,
                    message: "server error".to_string(),
                });
            }
            let mut created = self.created.lock();
            *created += 1;
            Ok(format!("thread_{created}"))
        }

        async fn add_message(&self, _: &str, _: &str) -> Result<(), BackendError> {
            Ok(())
        }

        async fn start_run(&self, _: &str) -> Result<String, BackendError> {
            Ok("run".to_string())
        }

        async fn run_status(&self, _: &str, _: &str) -> Result<RunState, BackendError> {
            unimplemented!("registry tests never poll")
        }

        async fn list_messages(&self, _: &str) -> Result<Vec<ThreadMessage>, BackendError> {
            Ok(Vec::new())
        }
    }

    fn file_store(dir: &TempDir) -> Box<dyn ThreadStore> {
        Box::new(FileThreadStore::open(dir.path().join("threads.json")).unwrap())
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let registry = ThreadRegistry::new(Arc::new(CountingBackend::default()), file_store(&dir));

        let first = registry.get_or_create(10).await.unwrap();
        let second = registry.get_or_create(10).await.unwrap();
        let third = registry.get_or_create(10).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(registry.stats().total_threads, 1);
    }

    #[tokio::test]
    async fn test_clear_then_create_yields_fresh_thread() {
        let dir = TempDir::new().unwrap();
        let registry = ThreadRegistry::new(Arc::new(CountingBackend::default()), file_store(&dir));

        let first = registry.get_or_create(10).await.unwrap();
        assert!(registry.clear(10));
        let second = registry.get_or_create(10).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_clear_missing_returns_false() {
        let dir = TempDir::new().unwrap();
        let registry = ThreadRegistry::new(Arc::new(CountingBackend::default()), file_store(&dir));
        assert!(!registry.clear(999));
    }

    #[tokio::test]
    async fn test_stats_counts_distinct_users() {
        let dir = TempDir::new().unwrap();
        let registry = ThreadRegistry::new(Arc::new(CountingBackend::default()), file_store(&dir));

        for user_id in 1..=5 {
            registry.get_or_create(user_id).await.unwrap();
        }
        let stats = registry.stats();
        assert_eq!(stats.total_threads, 5);
        assert_eq!(stats.active_users, 5);
    }

    #[tokio::test]
    async fn test_creation_failure_surfaces_and_stores_nothing() {
        let dir = TempDir::new().unwrap();
        let backend = CountingBackend {
            fail_creation: true,
            ..Default::default()
        };
        let registry = ThreadRegistry::new(Arc::new(backend), file_store(&dir));

        let err = registry.get_or_create(10).await.unwrap_err();
        assert!(err.to_string().contains("failed to create conversation thread"));
        assert_eq!(registry.stats().total_threads, 0);
    }

    #[tokio::test]
    async fn test_mapping_survives_restart() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(CountingBackend::default());

        let first = {
            let registry = ThreadRegistry::new(backend.clone(), file_store(&dir));
            registry.get_or_create(10).await.unwrap()
        };

        // New registry over the same store sees the same mapping without
        // touching the backend again.
        let registry = ThreadRegistry::new(backend.clone(), file_store(&dir));
        let second = registry.get_or_create(10).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(*backend.created.lock(), 1);
    }
}
