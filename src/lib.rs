//! ephemeral-store - Debounced, versioned key-value persistence.
//!
//! This crate is the local persistence layer of an ephemeral-mail client:
//! a namespaced wrapper over a synchronous, capacity-bounded, string-only
//! storage primitive (browser-style persistent storage).
//!
//! # Design Philosophy
//!
//! The store is a best-effort cache, not a durable log. Every failure class
//! is contained inside the layer and reported as a value: `save` returns a
//! status boolean, `load` returns the caller's default, bulk operations
//! return counts. Callers never handle exceptions from this layer, and a
//! corrupt or stale record can never crash them.
//!
//! # What the store does
//!
//! - **Debounced writes** - each `save` arms a per-key timer; later saves on
//!   the same key within the window supersede earlier ones, so only one
//!   physical write happens per quiescent period.
//! - **Versioned envelopes** - every record is stored as
//!   `{version, timestamp, data}`; payloads written by older builds pass
//!   through a [`Migrate`] hook on read, and pre-envelope bare values are
//!   still accepted.
//! - **Validation-on-read** - a rejected payload is treated as absent while
//!   the stored bytes are preserved for forensics.
//! - **Self-healing** - unparsable content is deleted on read; a
//!   quota-exceeded write triggers one age-based eviction sweep.
//! - **Graceful degradation** - a write/remove probe runs before every
//!   operation; while the primitive is unavailable the whole store becomes
//!   a safe no-op, with no cached "broken" latch.
//!
//! # Example
//!
//! ```ignore
//! use ephemeral_store::{KeyedStore, MemoryBackend, validators};
//! use std::sync::Arc;
//!
//! let store = KeyedStore::new(Arc::new(MemoryBackend::new()));
//!
//! store.save("emails", &emails);
//! let emails: Vec<EmailAccount> =
//!     store.load_validated("emails", Vec::new(), validators::email_list);
//! ```

pub mod backend;
pub mod envelope;
pub mod error;
pub mod keyspace;
pub mod migrate;
pub mod store;
pub mod validators;

pub use backend::{MemoryBackend, StorageBackend};
pub use envelope::{Envelope, StoredRecord};
pub use error::BackendError;
pub use keyspace::KeySpace;
pub use migrate::{Migrate, NoMigration};
pub use store::{KeyedStore, StorageInfo, StoreConfig};
