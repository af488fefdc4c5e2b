//! Storage primitive contract and the in-memory reference backend.
//!
//! The store depends only on [`StorageBackend`]: a synchronous, string-keyed
//! key/value surface with indexed enumeration for namespace scans. This is
//! the full contract of browser-style persistent storage; any primitive that
//! can express it (an actual `localStorage` bridge, a file-backed map, a
//! test double) can sit underneath a [`KeyedStore`](crate::KeyedStore).

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::BackendError;

/// Synchronous string-keyed storage primitive.
///
/// # Contract
///
/// - `get` returns the stored string, or `None` when the key is absent.
/// - `set` either stores the value or fails; [`BackendError::QuotaExceeded`]
///   is the one failure class the store reacts to specially.
/// - `remove` is idempotent; removing an absent key is a no-op.
/// - `len`/`key_at` enumerate every key in the primitive (not just one
///   store's namespace) so that prefix scans can filter.
///
/// Implementations must be thread-safe; the store shares its backend with
/// timer callbacks.
pub trait StorageBackend: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), BackendError>;

    /// Delete `key`. Deleting an absent key is a silent no-op.
    fn remove(&self, key: &str);

    /// Total number of keys currently stored, across all namespaces.
    fn len(&self) -> usize;

    /// Returns true if the primitive holds no keys at all.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The key at enumeration position `index`, or `None` if out of range.
    ///
    /// Enumeration order is implementation-defined but must be stable while
    /// no mutation occurs, so that a scan over `0..len()` visits every key
    /// exactly once.
    fn key_at(&self, index: usize) -> Option<String>;
}

/// Backends are routinely shared between several stores and the fallback
/// consumers of the same primitive, so `Arc<B>` is a backend too.
impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) {
        (**self).remove(key)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn key_at(&self, index: usize) -> Option<String> {
        (**self).key_at(index)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: BTreeMap<String, String>,
    /// Bytes currently accounted against the quota (key + value lengths).
    used_bytes: usize,
    /// Every key ever passed to a successful `set`, in order. Lets tests
    /// assert on physical write counts without scraping logs.
    write_log: Vec<String>,
    available: bool,
}

/// In-memory [`StorageBackend`] with an optional byte quota.
///
/// Mirrors the semantics of browser storage closely enough to exercise the
/// store's full failure surface: a configurable capacity that makes `set`
/// fail with [`BackendError::QuotaExceeded`], and an availability toggle
/// that simulates storage being disabled by the host environment.
///
/// Keys enumerate in sorted order.
#[derive(Debug)]
pub struct MemoryBackend {
    inner: RwLock<MemoryInner>,
    quota_bytes: Option<usize>,
}

impl MemoryBackend {
    /// Create an unbounded in-memory backend.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryInner {
                available: true,
                ..MemoryInner::default()
            }),
            quota_bytes: None,
        }
    }

    /// Create a backend that rejects writes once the combined byte length
    /// of all keys and values would exceed `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            inner: RwLock::new(MemoryInner {
                available: true,
                ..MemoryInner::default()
            }),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Toggle availability. While unavailable, every access fails the way a
    /// disabled browser store does: reads see nothing, writes are rejected.
    pub fn set_available(&self, available: bool) {
        self.write().available = available;
    }

    /// Number of successful `set` calls against `key` so far.
    pub fn writes_to(&self, key: &str) -> usize {
        self.read().write_log.iter().filter(|k| *k == key).count()
    }

    /// Bytes currently stored (keys + values).
    pub fn used_bytes(&self) -> usize {
        self.read().used_bytes
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        let inner = self.read();
        if !inner.available {
            return None;
        }
        inner.entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let mut inner = self.write();
        if !inner.available {
            return Err(BackendError::Unavailable {
                reason: "memory backend marked unavailable".to_string(),
            });
        }

        let replaced_bytes = inner
            .entries
            .get(key)
            .map(|existing| key.len() + existing.len())
            .unwrap_or(0);
        let required = inner.used_bytes - replaced_bytes + key.len() + value.len();

        if let Some(capacity) = self.quota_bytes {
            if required > capacity {
                return Err(BackendError::QuotaExceeded { required, capacity });
            }
        }

        inner.entries.insert(key.to_string(), value.to_string());
        inner.used_bytes = required;
        inner.write_log.push(key.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        let mut inner = self.write();
        if !inner.available {
            return;
        }
        if let Some(value) = inner.entries.remove(key) {
            inner.used_bytes -= key.len() + value.len();
        }
    }

    fn len(&self) -> usize {
        let inner = self.read();
        if !inner.available {
            return 0;
        }
        inner.entries.len()
    }

    fn key_at(&self, index: usize) -> Option<String> {
        let inner = self.read();
        if !inner.available {
            return None;
        }
        inner.entries.keys().nth(index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove_roundtrip() {
        let backend = MemoryBackend::new();

        backend.set("alpha", "1").expect("set should succeed");
        assert_eq!(backend.get("alpha"), Some("1".to_string()));

        backend.remove("alpha");
        assert_eq!(backend.get("alpha"), None);

        // Removing an absent key is a no-op.
        backend.remove("alpha");
    }

    #[test]
    fn test_enumeration_visits_every_key() {
        let backend = MemoryBackend::new();
        backend.set("b", "2").expect("set should succeed");
        backend.set("a", "1").expect("set should succeed");
        backend.set("c", "3").expect("set should succeed");

        let keys: Vec<String> = (0..backend.len())
            .filter_map(|i| backend.key_at(i))
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert!(backend.key_at(3).is_none());
    }

    #[test]
    fn test_quota_rejects_oversized_write() {
        let backend = MemoryBackend::with_quota(10);

        backend.set("k", "12345").expect("within quota");

        let err = backend
            .set("k2", "123456789")
            .expect_err("should exceed quota");
        assert!(err.is_quota_exceeded());

        // The failed write must not have mutated anything.
        assert_eq!(backend.get("k2"), None);
        assert_eq!(backend.used_bytes(), 6);
    }

    #[test]
    fn test_quota_accounts_for_replacement() {
        let backend = MemoryBackend::with_quota(10);
        backend.set("k", "12345678").expect("within quota");
        // Replacing with a shorter value frees the old bytes first.
        backend.set("k", "1").expect("replacement should fit");
        assert_eq!(backend.used_bytes(), 2);
    }

    #[test]
    fn test_unavailable_backend_fails_everything() {
        let backend = MemoryBackend::new();
        backend.set("k", "v").expect("set should succeed");

        backend.set_available(false);
        assert_eq!(backend.get("k"), None);
        assert_eq!(backend.len(), 0);
        assert!(matches!(
            backend.set("k2", "v"),
            Err(BackendError::Unavailable { .. })
        ));

        backend.set_available(true);
        assert_eq!(backend.get("k"), Some("v".to_string()));
    }

    #[test]
    fn test_write_log_counts_sets_per_key() {
        let backend = MemoryBackend::new();
        backend.set("k", "1").expect("set should succeed");
        backend.set("k", "2").expect("set should succeed");
        backend.set("other", "3").expect("set should succeed");

        assert_eq!(backend.writes_to("k"), 2);
        assert_eq!(backend.writes_to("other"), 1);
        assert_eq!(backend.writes_to("missing"), 0);
    }
}
