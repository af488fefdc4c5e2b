//! The namespaced, debounced key-value store.
//!
//! [`KeyedStore`] wraps a synchronous, capacity-bounded
//! [`StorageBackend`](crate::StorageBackend) and provides the persistence
//! contract the rest of the application codes against: debounced writes with
//! per-key coalescing, versioned envelopes with migration on read,
//! validation-on-read, corruption self-healing, and an age-based eviction
//! sweep for quota pressure.
//!
//! # Failure containment
//!
//! No error originating in this layer escapes a public operation. Failures
//! are reported as values: `save` returns `false`, `load` returns the
//! caller's default, bulk operations return counts. The availability probe
//! runs on every call, so a transient storage outage never latches the
//! store into a broken state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::backend::StorageBackend;
use crate::envelope::{Envelope, StoredRecord};
use crate::keyspace::KeySpace;
use crate::migrate::{Migrate, NoMigration};

/// Throwaway key used by the availability probe. Unprefixed: the probe
/// checks the primitive itself, not this store's namespace.
const PROBE_KEY: &str = "__ephemeral_store_probe__";

/// Configuration for a [`KeyedStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Namespace prefix prepended to every logical key.
    pub key_prefix: String,
    /// Schema version written into every envelope.
    pub version: String,
    /// Default delay between a `save` call and the physical write.
    pub debounce: Duration,
    /// Entries whose envelope timestamp is older than this are removed by
    /// the eviction sweep.
    pub max_entry_age: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "ephemeral_".to_string(),
            version: "1.0.0".to_string(),
            debounce: Duration::from_millis(300),
            max_entry_age: Duration::from_secs(30 * 24 * 60 * 60), // 30 days
        }
    }
}

impl StoreConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the namespace prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the schema version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the default debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the maximum entry age for the eviction sweep.
    pub fn with_max_entry_age(mut self, max_age: Duration) -> Self {
        self.max_entry_age = max_age;
        self
    }
}

/// Read-only storage diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageInfo {
    /// Number of committed entries in this store's namespace.
    pub entry_count: usize,
    /// Combined byte length of namespaced keys and values.
    pub total_size_bytes: usize,
    /// Number of debounced writes not yet committed.
    pub pending_writes: usize,
}

impl StorageInfo {
    /// Total size in kilobytes, rounded to two decimals.
    pub fn total_size_kb(&self) -> f64 {
        (self.total_size_bytes as f64 / 1024.0 * 100.0).round() / 100.0
    }
}

/// A scheduled, not-yet-committed write for one physical key.
///
/// The payload is retained so that `flush` can commit it synchronously
/// instead of dropping it. The sequence number guards against a timer that
/// fires after its write has already been superseded.
struct PendingWrite {
    seq: u64,
    data: Value,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct PendingState {
    writes: HashMap<String, PendingWrite>,
    next_seq: u64,
}

struct Inner<B> {
    backend: B,
    keys: KeySpace,
    config: StoreConfig,
    migrator: Box<dyn Migrate>,
    pending: Mutex<PendingState>,
}

impl<B: StorageBackend> Inner<B> {
    fn pending(&self) -> MutexGuard<'_, PendingState> {
        // A panicked timer task cannot leave the map in a bad state; the
        // poisoned guard is still consistent.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Verify the primitive is writable with a set/remove cycle.
    fn probe(&self) -> bool {
        match self.backend.set(PROBE_KEY, "probe") {
            Ok(()) => {
                self.backend.remove(PROBE_KEY);
                true
            }
            Err(error) => {
                tracing::warn!(error = %error, "storage primitive unavailable");
                false
            }
        }
    }

    /// Collect every physical key in this store's namespace. Collected up
    /// front so removals don't disturb the enumeration.
    fn namespaced_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for index in 0..self.backend.len() {
            if let Some(key) = self.backend.key_at(index) {
                if self.keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Perform the physical write for one payload. On quota exhaustion,
    /// runs one eviction sweep and drops the write without retrying.
    fn commit(&self, physical: &str, data: Value) -> bool {
        let envelope = Envelope::new(&self.config.version, data);
        let raw = match envelope.to_json() {
            Ok(raw) => raw,
            Err(error) => {
                tracing::error!(key = %physical, error = %error, "failed to serialize envelope, write dropped");
                return false;
            }
        };

        match self.backend.set(physical, &raw) {
            Ok(()) => true,
            Err(error) if error.is_quota_exceeded() => {
                tracing::error!(key = %physical, error = %error, "write dropped, running eviction sweep");
                self.sweep();
                false
            }
            Err(error) => {
                tracing::error!(key = %physical, error = %error, "write dropped");
                false
            }
        }
    }

    /// Timer callback: commit the pending write for `physical` if it is
    /// still the one this timer was armed for.
    fn commit_if_current(&self, physical: &str, seq: u64) {
        let write = {
            let mut pending = self.pending();
            match pending.writes.get(physical) {
                Some(write) if write.seq == seq => pending.writes.remove(physical),
                // Superseded or cancelled between firing and locking.
                _ => None,
            }
        };
        if let Some(write) = write {
            self.commit(physical, write.data);
        }
    }

    /// Age-based eviction sweep over this store's namespace.
    ///
    /// Removes entries whose envelope timestamp is older than
    /// `max_entry_age`, and entries that fail to parse at all. Entries that
    /// parse but carry no usable timestamp (legacy values) are retained.
    fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut stale = Vec::new();

        for key in self.namespaced_keys() {
            let Some(raw) = self.backend.get(&key) else {
                continue;
            };
            match StoredRecord::parse(&raw) {
                Err(error) => {
                    tracing::warn!(key = %key, error = %error, "removing corrupted entry during sweep");
                    stale.push(key);
                }
                Ok(record) => {
                    if let Some(timestamp) = record.timestamp() {
                        let age = now
                            .signed_duration_since(timestamp)
                            .to_std()
                            .unwrap_or(Duration::ZERO);
                        if age > self.config.max_entry_age {
                            stale.push(key);
                        }
                    }
                }
            }
        }

        let removed = stale.len();
        for key in &stale {
            self.backend.remove(key);
        }
        if removed > 0 {
            tracing::info!(count = removed, "cleaned up stale storage entries");
        }
        removed
    }
}

/// Namespaced key-value store with debounced writes and versioned records.
///
/// # Example
///
/// ```ignore
/// let backend = Arc::new(MemoryBackend::new());
/// let store = KeyedStore::new(backend);
///
/// store.save("emails", &emails);                 // committed after 300ms
/// let emails: Vec<EmailAccount> = store.load("emails", Vec::new());
/// ```
///
/// Cloning is cheap; clones share the same backend, config, and pending
/// write set.
pub struct KeyedStore<B: StorageBackend + 'static> {
    inner: Arc<Inner<B>>,
}

impl<B: StorageBackend + 'static> Clone for KeyedStore<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: StorageBackend + 'static> KeyedStore<B> {
    /// Create a store with default configuration (`ephemeral_` prefix,
    /// version `1.0.0`, 300ms debounce, 30 day eviction age).
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, StoreConfig::default())
    }

    /// Create a store with explicit configuration.
    pub fn with_config(backend: B, config: StoreConfig) -> Self {
        Self::build(backend, config, Box::new(NoMigration))
    }

    /// Create a store with a migration hook for payloads written under an
    /// older schema version.
    pub fn with_migrator(
        backend: B,
        config: StoreConfig,
        migrator: impl Migrate + 'static,
    ) -> Self {
        Self::build(backend, config, Box::new(migrator))
    }

    fn build(backend: B, config: StoreConfig, migrator: Box<dyn Migrate>) -> Self {
        let keys = KeySpace::new(config.key_prefix.clone());
        Self {
            inner: Arc::new(Inner {
                backend,
                keys,
                config,
                migrator,
                pending: Mutex::new(PendingState::default()),
            }),
        }
    }

    /// The store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// A reference to the underlying storage primitive.
    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    /// Whether the underlying primitive is currently writable.
    ///
    /// Probed with a throwaway write/remove cycle on every public
    /// operation; there is no cached latch, so a transient outage does not
    /// permanently disable the store.
    pub fn is_available(&self) -> bool {
        self.inner.probe()
    }

    /// Schedule a debounced write of `data` under `key` using the
    /// configured debounce window.
    ///
    /// Returns `true` if the write was scheduled. Only the most recent
    /// value within the window is ever committed; an earlier pending write
    /// for the same key is cancelled and replaced.
    ///
    /// Debounce timers run on the ambient Tokio runtime, so `save` must be
    /// called from within one.
    pub fn save<T: Serialize>(&self, key: &str, data: &T) -> bool {
        self.save_with_debounce(key, data, self.inner.config.debounce)
    }

    /// Schedule a debounced write with an explicit debounce window.
    pub fn save_with_debounce<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        debounce: Duration,
    ) -> bool {
        if !self.inner.probe() {
            return false;
        }

        let data = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(error) => {
                tracing::error!(key, error = %error, "payload is not serializable, save rejected");
                return false;
            }
        };

        let physical = self.inner.keys.physical(key);
        let mut pending = self.inner.pending();
        let seq = pending.next_seq;
        pending.next_seq += 1;

        if let Some(superseded) = pending.writes.remove(&physical) {
            superseded.handle.abort();
        }

        let inner = Arc::clone(&self.inner);
        let task_key = physical.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            inner.commit_if_current(&task_key, seq);
        });

        pending.writes.insert(physical, PendingWrite { seq, data, handle });
        true
    }

    /// Load the value stored under `key`, or `default` if absent.
    ///
    /// Accepts both the current envelope shape and legacy bare values.
    /// Payloads written under a different schema version pass through the
    /// migration hook first. Corrupt (unparsable) content is deleted and
    /// `default` returned. No error escapes.
    pub fn load<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.load_validated(key, default, |_| true)
    }

    /// Load with a semantic validator applied after migration.
    ///
    /// A payload rejected by `validator` is treated as absent: `default` is
    /// returned and the stored value is left untouched for forensics. The
    /// same policy applies when the payload does not deserialize into `T`.
    pub fn load_validated<T, F>(&self, key: &str, default: T, validator: F) -> T
    where
        T: DeserializeOwned,
        F: Fn(&Value) -> bool,
    {
        if !self.inner.probe() {
            return default;
        }

        let physical = self.inner.keys.physical(key);
        let Some(raw) = self.inner.backend.get(&physical) else {
            return default;
        };

        let record = match StoredRecord::parse(&raw) {
            Ok(record) => record,
            Err(error) => {
                tracing::error!(key, error = %error, "stored content is corrupt, deleting");
                self.remove(key);
                return default;
            }
        };

        let data = match record {
            StoredRecord::Enveloped {
                version: Some(from),
                data,
                ..
            } if from != self.inner.config.version => {
                tracing::info!(
                    key,
                    from = %from,
                    to = %self.inner.config.version,
                    "stored data version differs, migrating"
                );
                self.inner
                    .migrator
                    .migrate(key, data, &from, &self.inner.config.version)
            }
            StoredRecord::Enveloped { data, .. } => data,
            StoredRecord::Legacy(data) => data,
        };

        if !validator(&data) {
            tracing::warn!(key, "stored value failed validation, using default");
            return default;
        }

        match serde_json::from_value(data) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(key, error = %error, "stored value does not deserialize, using default");
                default
            }
        }
    }

    /// Delete `key` and cancel any pending write for it. Idempotent.
    pub fn remove(&self, key: &str) {
        if !self.inner.probe() {
            return;
        }
        let physical = self.inner.keys.physical(key);
        self.inner.backend.remove(&physical);
        if let Some(write) = self.inner.pending().writes.remove(&physical) {
            write.handle.abort();
        }
    }

    /// Delete every entry in this store's namespace and cancel all pending
    /// writes. Keys outside the prefix are untouched. Returns the number of
    /// committed entries removed.
    pub fn clear_all(&self) -> usize {
        if !self.inner.probe() {
            return 0;
        }

        let keys = self.inner.namespaced_keys();
        for key in &keys {
            self.inner.backend.remove(key);
        }

        let mut pending = self.inner.pending();
        for (_, write) in pending.writes.drain() {
            write.handle.abort();
        }

        keys.len()
    }

    /// Run the eviction sweep now. Returns the number of entries removed.
    ///
    /// Also invoked automatically when a write fails with quota
    /// exhaustion.
    pub fn clear_old_data(&self) -> usize {
        if !self.inner.probe() {
            return 0;
        }
        self.inner.sweep()
    }

    /// Commit every pending debounced write synchronously, cancelling its
    /// timer. Returns the number of writes committed. After `flush`
    /// returns, no previously scheduled write will fire on its own.
    pub fn flush(&self) -> usize {
        let drained: Vec<(String, PendingWrite)> =
            self.inner.pending().writes.drain().collect();

        let mut committed = 0;
        for (physical, write) in drained {
            write.handle.abort();
            if self.inner.commit(&physical, write.data) {
                committed += 1;
            }
        }
        committed
    }

    /// Diagnostics for this store's namespace, or `None` if the primitive
    /// is unavailable. Does not mutate any namespaced entry.
    pub fn storage_info(&self) -> Option<StorageInfo> {
        if !self.inner.probe() {
            return None;
        }

        let mut entry_count = 0;
        let mut total_size_bytes = 0;
        for key in self.inner.namespaced_keys() {
            let value_len = self.inner.backend.get(&key).map_or(0, |v| v.len());
            total_size_bytes += key.len() + value_len;
            entry_count += 1;
        }

        let pending_writes = self.inner.pending().writes.len();
        Some(StorageInfo {
            entry_count,
            total_size_bytes,
            pending_writes,
        })
    }
}
