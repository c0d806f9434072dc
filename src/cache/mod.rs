//! TTL cache for vulnerability reports.
//!
//! Reports are cached per coordinate, keyed by the lower-cased canonical
//! coordinate string. Entries expire after a configurable number of hours;
//! expiry is checked lazily when an entry is read.
//!
//! Two stores are provided:
//! - [`FileCacheStore`] - a single JSON document shared between processes,
//!   guarded by an advisory lock on a sidecar `<file>.lock`
//! - [`MemoryCacheStore`] - a process-local map, used when caching is disabled
//!   or the cache file cannot be opened
//!
//! # Cache Location
//!
//! The default cache file lives in the platform cache directory:
//! - Linux: `~/.cache/ossaudit/audit-cache.json`
//! - macOS: `~/Library/Caches/ossaudit/audit-cache.json`
//! - Windows: `%LOCALAPPDATA%\ossaudit\audit-cache.json`
//!
//! # Example
//!
//! ```
//! use ossaudit::cache::{CacheEntry, CacheStore, MemoryCacheStore};
//!
//! let store = MemoryCacheStore::new(12);
//! store.commit(vec![("maven:org.webjars.npm/jquery@1.2.3".to_string(), CacheEntry::new("{}"))])?;
//!
//! assert!(store.get("maven:org.webjars.npm/jquery@1.2.3")?.is_some());
//! # Ok::<(), ossaudit::error::CacheError>(())
//! ```

mod file;
mod memory;

pub use file::FileCacheStore;
pub use memory::MemoryCacheStore;

use crate::error::CacheError;
use crate::model::AuditedPackage;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A cached, serialized [`AuditedPackage`] and the time it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            created_at: Utc::now(),
        }
    }

    pub fn for_package(package: &AuditedPackage) -> serde_json::Result<Self> {
        Ok(Self::new(serde_json::to_string(package)?))
    }

    pub fn package(&self) -> serde_json::Result<AuditedPackage> {
        serde_json::from_str(&self.value)
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at > ttl
    }
}

/// Key/value storage for cached reports.
///
/// Calls may block on disk I/O or a file lock; async callers run commits on
/// the blocking thread pool.
pub trait CacheStore: Send + Sync {
    /// Returns the entry for `key`, or `None` when it is absent or expired.
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Returns the live entries among `keys` in one read. Absent and expired
    /// keys are left out.
    fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, CacheEntry>, CacheError> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.get(key)? {
                found.insert(key.to_string(), entry);
            }
        }
        Ok(found)
    }

    /// Stores a batch of entries. Either every entry is written or none is.
    fn commit(&self, entries: Vec<(String, CacheEntry)>) -> Result<(), CacheError>;

    /// Removes every entry.
    fn clear(&self) -> Result<(), CacheError>;
}

pub(crate) fn ttl_from_hours(hours: u64) -> Duration {
    i64::try_from(hours)
        .ok()
        .and_then(Duration::try_hours)
        .unwrap_or(Duration::MAX)
}
