use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

// Held while a writer owns a file; dropping it releases the file
pub struct FileGuard {
    file_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl FileGuard {
    pub fn file_id(&self) -> &str {
        &self.file_id
    }
}

impl Drop for FileGuard {
    fn drop(&mut self) {
        debug!("Released write lock for file_id={}", self.file_id);
    }
}

// Serialises writers per file id; different files never block each other
#[derive(Clone, Default)]
pub struct FileLockRegistry {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl FileLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Waits until no other writer holds `file_id`
    pub async fn acquire(&self, file_id: &str) -> FileGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

            // Entries nobody holds or waits on can go
            locks.retain(|id, lock| id == file_id || Arc::strong_count(lock) > 1);

            locks
                .entry(file_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = lock.lock_owned().await;
        debug!("Acquired write lock for file_id={}", file_id);

        FileGuard {
            file_id: file_id.to_string(),
            _guard: guard,
        }
    }

    // True while some writer holds the file
    #[cfg(test)]
    pub fn is_locked(&self, file_id: &str) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .get(file_id)
            .map_or(false, |lock| lock.try_lock().is_err())
    }

    #[cfg(test)]
    pub fn tracked_files(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_file_is_serialised() {
        let registry = FileLockRegistry::new();
        let guard = registry.acquire("doc1").await;
        assert!(registry.is_locked("doc1"));
        assert_eq!(guard.file_id(), "doc1");

        let contender = registry.clone();
        let waiter = tokio::spawn(async move {
            let _guard = contender.acquire("doc1").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert!(!registry.is_locked("doc1"));
    }

    #[tokio::test]
    async fn different_files_do_not_block() {
        let registry = FileLockRegistry::new();
        let _a = registry.acquire("doc1").await;
        let _b = registry.acquire("doc2").await;
        assert!(registry.is_locked("doc1"));
        assert!(registry.is_locked("doc2"));
    }

    #[tokio::test]
    async fn idle_entries_are_dropped() {
        let registry = FileLockRegistry::new();
        drop(registry.acquire("doc1").await);
        drop(registry.acquire("doc2").await);
        let _c = registry.acquire("doc3").await;
        assert_eq!(registry.tracked_files(), 1);
    }
}
