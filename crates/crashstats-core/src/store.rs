//! Shared counter and cache store.
//!
//! Rate-limit counters and cached responses must be visible to every
//! gateway instance, so the store is injected rather than held in process
//! globals. [`InMemoryStore`] serves single-instance deployments and tests.

use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Atomically increment the counter for `key` in its current fixed
    /// window of length `window`, returning the new count. The first
    /// increment opens the window.
    async fn incr_window(&self, key: &str, window: Duration) -> Result<u64, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
}

#[derive(Debug)]
enum Slot {
    Counter(u64),
    Value(String),
}

#[derive(Debug)]
struct Entry {
    slot: Slot,
    expires_at: Instant,
}

/// Process-local store with bounded key count
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
    max_keys: usize,
}

impl InMemoryStore {
    pub fn new(max_keys: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            max_keys,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries, then the soonest-expiring live ones until the
    /// cap holds. `keep` is the key just written and is never evicted.
    fn evict(inner: &mut HashMap<String, Entry>, now: Instant, max_keys: usize, keep: &str) {
        inner.retain(|_, entry| entry.expires_at > now);
        if inner.len() <= max_keys {
            return;
        }

        let overflow = inner.len() - max_keys;
        tracing::debug!(overflow, max_keys, "Evicting live keys from in-memory store");
        let mut candidates = inner
            .iter()
            .filter(|(key, _)| key.as_str() != keep)
            .map(|(key, entry)| (entry.expires_at, key.clone()))
            .collect::<Vec<_>>();
        candidates.sort();
        for (_, key) in candidates.into_iter().take(overflow) {
            inner.remove(&key);
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn incr_window(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut inner = self.lock();

        let count = match inner.get_mut(key).filter(|entry| entry.expires_at > now) {
            Some(Entry {
                slot: Slot::Counter(count),
                ..
            }) => {
                *count += 1;
                *count
            }
            Some(_) => {
                return Err(StoreError::Corrupt(format!(
                    "{key} holds a value, not a counter"
                )))
            }
            None => {
                inner.insert(
                    key.to_string(),
                    Entry {
                        slot: Slot::Counter(1),
                        expires_at: now + window,
                    },
                );
                1
            }
        };

        if inner.len() > self.max_keys {
            Self::evict(&mut inner, now, self.max_keys, key);
        }
        Ok(count)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let inner = self.lock();
        Ok(inner.get(key).and_then(|entry| match &entry.slot {
            Slot::Value(value) if entry.expires_at > now => Some(value.clone()),
            _ => None,
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.insert(
            key.to_string(),
            Entry {
                slot: Slot::Value(value.to_string()),
                expires_at: now + ttl,
            },
        );
        if inner.len() > self.max_keys {
            Self::evict(&mut inner, now, self.max_keys, key);
        }
        Ok(())
    }
}
