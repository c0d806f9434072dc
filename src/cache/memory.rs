use super::{ttl_from_hours, CacheEntry, CacheStore};
use crate::error::CacheError;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Process-local cache store.
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl MemoryCacheStore {
    pub fn new(ttl_hours: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: ttl_from_hours(ttl_hours),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(self.ttl, Utc::now()))
            .cloned())
    }

    fn commit(&self, batch: Vec<(String, CacheEntry)>) -> Result<(), CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.extend(batch);
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}
