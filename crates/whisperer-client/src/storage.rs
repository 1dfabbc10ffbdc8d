//! Durable key/value storage for the auth record.
//!
//! The session store persists the application token, the serialized user and
//! the auth source here, and the auth flows keep two transient guard flags
//! (logout in progress, token exchange in progress). Guard flags are claimed
//! with [`PersistedStore::claim`], which implementations must make atomic.
//! A flag holds the time it was claimed and expires after [`GUARD_FLAG_TTL`],
//! so a claim left behind by a killed process does not block sign-in forever.
//!
//! Two implementations are provided:
//!
//! - [`MemoryStore`] - process-local map, used by tests and embedders
//! - [`FileStore`] - one JSON document on disk, survives restarts

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fs2::FileExt;
use tempfile::NamedTempFile;

use crate::ClientResult;
use crate::error::ClientError;

/// Storage keys owned by this crate.
pub mod keys {
    /// Application bearer token.
    pub const TOKEN: &str = "auth_token";
    /// JSON-serialized [`User`](crate::types::User).
    pub const USER: &str = "auth_user";
    /// [`AuthSource`](crate::types::AuthSource) tag.
    pub const SOURCE: &str = "auth_source";
    /// Set while a logout is tearing down state.
    pub const LOGGING_OUT: &str = "logging_out";
    /// Set while an external token exchange is in flight.
    pub const EXCHANGE_IN_PROGRESS: &str = "token_exchange_in_progress";

    /// Keys making up the persisted auth record.
    pub const AUTH_RECORD: [&str; 3] = [TOKEN, USER, SOURCE];
}

/// Synchronous key/value persistence.
pub trait PersistedStore: Send + Sync {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> ClientResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> ClientResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> ClientResult<()>;

    /// Stores `value` if `key` is absent or its current value is `stale`.
    /// Returns whether it was stored.
    fn claim(&self, key: &str, value: &str, stale: &dyn Fn(&str) -> bool) -> ClientResult<bool>;

    /// Stores `value` only if `key` is absent. Returns whether it was stored.
    fn set_if_absent(&self, key: &str, value: &str) -> ClientResult<bool> {
        self.claim(key, value, &|_| false)
    }

    /// Returns `true` if `key` holds a value.
    fn contains(&self, key: &str) -> ClientResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// In-memory store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PersistedStore for MemoryStore {
    fn get(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn claim(&self, key: &str, value: &str, stale: &dyn Fn(&str) -> bool) -> ClientResult<bool> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut slot) if stale(slot.get()) => {
                slot.insert(value.to_string());
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(value.to_string());
                Ok(true)
            }
        }
    }
}

/// Store persisted as a single JSON object in a file.
///
/// Every operation re-reads the file under an OS lock on a sibling
/// `<file>.lock`, so separate processes sharing a profile observe each other's
/// writes and [`claim`](PersistedStore::claim) stays atomic between them.
/// Writes go to a temporary file that is renamed into place.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Opens (without creating) the store at `path`. Parent directories and
    /// the lock file are created on first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn open_lock(&self) -> ClientResult<File> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ClientError::storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                ClientError::storage(format!("failed to open lock {}: {e}", lock_path.display()))
            })
    }

    fn read_all(&self) -> ClientResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| {
            ClientError::storage(format!("failed to read {}: {e}", self.path.display()))
        })?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            ClientError::storage(format!("corrupt store {}: {e}", self.path.display()))
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> ClientResult<()> {
        if entries.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path).map_err(|e| {
                    ClientError::storage(format!("failed to remove {}: {e}", self.path.display()))
                })?;
            }
            return Ok(());
        }
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let content = serde_json::to_string_pretty(entries)?;
        let mut temp = NamedTempFile::new_in(parent).map_err(|e| {
            ClientError::storage(format!("failed to create temp file in {}: {e}", parent.display()))
        })?;
        temp.write_all(content.as_bytes()).map_err(|e| {
            ClientError::storage(format!("failed to write {}: {e}", self.path.display()))
        })?;
        temp.persist(&self.path).map_err(|e| {
            ClientError::storage(format!("failed to replace {}: {e}", self.path.display()))
        })?;
        Ok(())
    }

    fn with_lock<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> (bool, T),
    ) -> ClientResult<T> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| ClientError::storage("store lock poisoned"))?;
        let lock_file = self.open_lock()?;
        FileExt::lock_exclusive(&lock_file).map_err(|e| {
            ClientError::storage(format!("failed to lock {}: {e}", self.path.display()))
        })?;
        let mut entries = self.read_all()?;
        let (dirty, out) = f(&mut entries);
        if dirty {
            self.write_all(&entries)?;
        }
        drop(lock_file);
        Ok(out)
    }
}

impl PersistedStore for FileStore {
    fn get(&self, key: &str) -> ClientResult<Option<String>> {
        self.with_lock(|entries| (false, entries.get(key).cloned()))
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.with_lock(|entries| {
            entries.insert(key.to_string(), value.to_string());
            (true, ())
        })
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        self.with_lock(|entries| (entries.remove(key).is_some(), ()))
    }

    fn claim(&self, key: &str, value: &str, stale: &dyn Fn(&str) -> bool) -> ClientResult<bool> {
        self.with_lock(|entries| {
            if entries.get(key).is_some_and(|current| !stale(current)) {
                return (false, false);
            }
            entries.insert(key.to_string(), value.to_string());
            (true, true)
        })
    }
}

/// How long a guard flag holds before another claimant may take it over.
pub const GUARD_FLAG_TTL: Duration = Duration::from_secs(120);

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Whether a flag value written by [`claim_flag`] has outlived `ttl`.
/// Values that are not a claim time count as expired.
fn flag_expired(value: &str, ttl: Duration) -> bool {
    match value.parse::<u128>() {
        Ok(claimed) => now_millis().abs_diff(claimed) > ttl.as_millis(),
        Err(_) => true,
    }
}

/// Claims the guard flag `key`, taking over a claim older than `ttl`.
pub fn claim_flag(store: &dyn PersistedStore, key: &str, ttl: Duration) -> ClientResult<bool> {
    let stamp = now_millis().to_string();
    store.claim(key, &stamp, &|current| {
        let expired = flag_expired(current, ttl);
        if expired {
            tracing::warn!(key, "taking over an expired guard flag");
        }
        expired
    })
}

/// Sets the guard flag `key` unconditionally.
pub fn raise_flag(store: &dyn PersistedStore, key: &str) -> ClientResult<()> {
    store.set(key, &now_millis().to_string())
}

/// Returns `true` if `key` holds a claim younger than `ttl`.
pub fn flag_held(store: &dyn PersistedStore, key: &str, ttl: Duration) -> ClientResult<bool> {
    Ok(store
        .get(key)?
        .is_some_and(|value| !flag_expired(&value, ttl)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn PersistedStore) {
        assert_eq!(store.get(keys::TOKEN).unwrap(), None);
        store.set(keys::TOKEN, "abc").unwrap();
        assert_eq!(store.get(keys::TOKEN).unwrap().as_deref(), Some("abc"));
        store.set(keys::TOKEN, "def").unwrap();
        assert_eq!(store.get(keys::TOKEN).unwrap().as_deref(), Some("def"));
        store.remove(keys::TOKEN).unwrap();
        assert!(!store.contains(keys::TOKEN).unwrap());
        store.remove(keys::TOKEN).unwrap();

        assert!(store.set_if_absent(keys::EXCHANGE_IN_PROGRESS, "true").unwrap());
        assert!(!store.set_if_absent(keys::EXCHANGE_IN_PROGRESS, "true").unwrap());
        store.remove(keys::EXCHANGE_IN_PROGRESS).unwrap();
        assert!(store.set_if_absent(keys::EXCHANGE_IN_PROGRESS, "true").unwrap());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        exercise(&store);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("session.json"));
        exercise(&store);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        FileStore::new(&path).set(keys::USER, r#"{"a":1}"#).unwrap();
        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get(keys::USER).unwrap().as_deref(),
            Some(r#"{"a":1}"#)
        );
    }

    #[test]
    fn test_file_store_removes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileStore::new(&path);

        store.set(keys::TOKEN, "t").unwrap();
        assert!(path.exists());
        store.remove(keys::TOKEN).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_file_store_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();

        let err = FileStore::new(&path).get(keys::TOKEN).unwrap_err();
        assert!(matches!(err, ClientError::Storage { .. }));
    }

    #[test]
    fn test_file_stores_sharing_a_path_claim_once() {
        use std::sync::Barrier;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let first = FileStore::new(&path);
        let second = FileStore::new(&path);
        first.set(keys::TOKEN, "t").unwrap();

        for _ in 0..100 {
            let barrier = Barrier::new(2);
            let winners = std::thread::scope(|scope| {
                let handles = [&first, &second].map(|store| {
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        store.set_if_absent(keys::EXCHANGE_IN_PROGRESS, "1").unwrap()
                    })
                });
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap())
                    .filter(|claimed| *claimed)
                    .count()
            });
            assert_eq!(winners, 1);
            assert_eq!(second.get(keys::TOKEN).unwrap().as_deref(), Some("t"));
            first.remove(keys::EXCHANGE_IN_PROGRESS).unwrap();
        }
    }

    #[test]
    fn test_expired_flag_can_be_claimed() {
        let store = MemoryStore::new();

        assert!(claim_flag(&store, keys::EXCHANGE_IN_PROGRESS, GUARD_FLAG_TTL).unwrap());
        assert!(!claim_flag(&store, keys::EXCHANGE_IN_PROGRESS, GUARD_FLAG_TTL).unwrap());
        assert!(flag_held(&store, keys::EXCHANGE_IN_PROGRESS, GUARD_FLAG_TTL).unwrap());

        store.set(keys::EXCHANGE_IN_PROGRESS, "0").unwrap();
        assert!(!flag_held(&store, keys::EXCHANGE_IN_PROGRESS, GUARD_FLAG_TTL).unwrap());
        assert!(claim_flag(&store, keys::EXCHANGE_IN_PROGRESS, GUARD_FLAG_TTL).unwrap());

        store.set(keys::LOGGING_OUT, "true").unwrap();
        assert!(!flag_held(&store, keys::LOGGING_OUT, GUARD_FLAG_TTL).unwrap());
    }

    #[test]
    fn test_file_store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileStore::new(&path);

        store.set(keys::TOKEN, "a").unwrap();
        store.set(keys::USER, "b").unwrap();

        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, ["session.json", "session.json.lock"]);
    }
}
