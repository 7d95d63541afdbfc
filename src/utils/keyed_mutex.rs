use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async mutex scoped to a string key.
///
/// Chunk-upload completion locks on `{bucket}/{upload_session_id}` so two
/// completions of the same session run one after the other while unrelated
/// sessions proceed in parallel.
#[derive(Debug, Clone, Default)]
pub struct KeyedMutex {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held lock on one key. Dropping it unlocks, and forgets the key when no
/// other task holds or waits on it.
#[derive(Debug)]
pub struct KeyedMutexGuard {
    key: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyedMutexGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the lock on `key`. Released when the guard is dropped.
    pub async fn lock(&self, key: &str) -> KeyedMutexGuard {
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        let guard = mutex.lock_owned().await;
        KeyedMutexGuard {
            key: key.to_string(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
