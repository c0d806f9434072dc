use super::{ttl_from_hours, CacheEntry, CacheStore};
use crate::error::CacheError;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration as StdDuration, Instant};
use tracing::{debug, warn};

/// How long a commit waits for another process to release the cache lock.
const LOCK_WAIT: StdDuration = StdDuration::from_millis(1000);
const LOCK_POLL: StdDuration = StdDuration::from_millis(25);

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    #[serde(default)]
    entries: BTreeMap<String, CacheEntry>,
}

/// Cache store backed by a single JSON file.
///
/// Reads parse the file once per call, without locking. Commits lock `<file>.lock`, re-read the
/// document so writes from other processes are kept, apply the batch and
/// atomically replace the file.
pub struct FileCacheStore {
    path: PathBuf,
    ttl: Duration,
}

impl FileCacheStore {
    /// Opens (creating if needed) the cache file at `path`.
    pub fn open(path: impl Into<PathBuf>, ttl_hours: u64) -> Result<Self, CacheError> {
        let path = path.into();
        let unavailable = |reason: String| CacheError::Unavailable {
            path: path.clone(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| unavailable(e.to_string()))?;

        debug!("Using cache file {}", path.display());
        Ok(Self {
            path,
            ttl: ttl_from_hours(ttl_hours),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Takes the exclusive lock, polling until [`LOCK_WAIT`] has elapsed.
    /// The lock is released when the returned file is dropped.
    fn lock(&self) -> io::Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())?;
        let started = Instant::now();
        loop {
            match file.try_lock() {
                Ok(()) => return Ok(file),
                Err(TryLockError::WouldBlock) if started.elapsed() < LOCK_WAIT => {
                    std::thread::sleep(LOCK_POLL);
                }
                Err(TryLockError::WouldBlock) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WouldBlock,
                        format!("cache is locked by another process ({})", self.lock_path().display()),
                    ));
                }
                Err(TryLockError::Error(e)) => return Err(e),
            }
        }
    }

    fn read_document(&self) -> io::Result<CacheDocument> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CacheDocument::default()),
            Err(e) => return Err(e),
        };
        if content.trim().is_empty() {
            return Ok(CacheDocument::default());
        }
        match serde_json::from_str(&content) {
            Ok(document) => Ok(document),
            Err(e) => {
                warn!(
                    "Ignoring unreadable cache file {}: {}",
                    self.path.display(),
                    e
                );
                Ok(CacheDocument::default())
            }
        }
    }

    fn write_document(&self, document: &CacheDocument) -> io::Result<()> {
        let content = serde_json::to_string(document)?;
        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)
    }

    fn update<F>(&self, apply: F) -> io::Result<()>
    where
        F: FnOnce(&mut CacheDocument),
    {
        let _lock = self.lock()?;
        let mut document = self.read_document()?;
        apply(&mut document);
        self.write_document(&document)
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.get_many(&[key])?.remove(key))
    }

    fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, CacheEntry>, CacheError> {
        let mut document = self.read_document().map_err(|e| CacheError::Read {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        let now = Utc::now();
        Ok(keys
            .iter()
            .filter_map(|key| {
                let entry = document.entries.remove(*key)?;
                (!entry.is_expired(self.ttl, now)).then(|| (key.to_string(), entry))
            })
            .collect())
    }

    fn commit(&self, batch: Vec<(String, CacheEntry)>) -> Result<(), CacheError> {
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len();
        let ttl = self.ttl;
        self.update(|document| {
            let now = Utc::now();
            document.entries.retain(|_, entry| !entry.is_expired(ttl, now));
            document.entries.extend(batch);
        })
        .map_err(|e| CacheError::Write {
            path: self.path.clone(),
            entries: count,
            reason: e.to_string(),
        })?;
        debug!("Committed {} cache entries to {}", count, self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.update(|document| document.entries.clear())
            .map_err(|e| CacheError::Write {
                path: self.path.clone(),
                entries: 0,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> FileCacheStore {
        FileCacheStore::open(dir.path().join("nested").join("audit-cache.json"), 12).unwrap()
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.path().exists());
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_open_directory_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let err = FileCacheStore::open(dir.path(), 12).err().unwrap();
        assert!(matches!(err, CacheError::Unavailable { .. }));
    }

    #[test]
    fn test_commit_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        store_in(&dir)
            .commit(vec![("a".to_string(), CacheEntry::new("1"))])
            .unwrap();

        let reopened = store_in(&dir);
        assert_eq!(reopened.get("a").unwrap().unwrap().value, "1");
    }

    #[test]
    fn test_commits_from_two_handles_are_merged() {
        let dir = TempDir::new().unwrap();
        let first = store_in(&dir);
        let second = store_in(&dir);
        first.commit(vec![("a".to_string(), CacheEntry::new("1"))]).unwrap();
        second.commit(vec![("b".to_string(), CacheEntry::new("2"))]).unwrap();

        assert!(first.get("a").unwrap().is_some());
        assert!(first.get("b").unwrap().is_some());
    }

    #[test]
    fn test_expired_entries_are_misses_and_pruned() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let mut stale = CacheEntry::new("old");
        stale.created_at = Utc::now() - Duration::hours(24);
        store.commit(vec![("stale".to_string(), stale)]).unwrap();
        assert!(store.get("stale").unwrap().is_none());

        store.commit(vec![("fresh".to_string(), CacheEntry::new("new"))]).unwrap();
        let document = store.read_document().unwrap();
        assert!(!document.entries.contains_key("stale"));
        assert!(document.entries.contains_key("fresh"));
    }

    #[test]
    fn test_get_many_reads_requested_entries() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let mut stale = CacheEntry::new("old");
        stale.created_at = Utc::now() - Duration::hours(24);
        store
            .commit(vec![
                ("a".to_string(), CacheEntry::new("1")),
                ("b".to_string(), CacheEntry::new("2")),
                ("c".to_string(), CacheEntry::new("3")),
            ])
            .unwrap();
        store.commit(vec![("stale".to_string(), stale)]).unwrap();

        let found = store.get_many(&["a", "c", "stale", "missing"]).unwrap();
        let mut keys: Vec<&str> = found.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "c"]);
        assert_eq!(found["c"].value, "3");
    }

    #[test]
    fn test_corrupt_document_is_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{not json").unwrap();
        assert!(store.get("a").unwrap().is_none());

        store.commit(vec![("a".to_string(), CacheEntry::new("1"))]).unwrap();
        assert!(store.get("a").unwrap().is_some());
    }

    #[test]
    fn test_commit_fails_while_locked_elsewhere() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let held = File::create(store.lock_path()).unwrap();
        held.lock().unwrap();

        let err = store
            .commit(vec![("a".to_string(), CacheEntry::new("1"))])
            .unwrap_err();
        assert!(matches!(err, CacheError::Write { entries: 1, .. }));
        drop(held);

        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn test_clear_removes_entries() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.commit(vec![("a".to_string(), CacheEntry::new("1"))]).unwrap();
        store.clear().unwrap();
        assert!(store.get("a").unwrap().is_none());
    }
}
