//! its123 Store - fail-soft persistence for assessment runs
//!
//! Keeps the state a run needs to survive a restart:
//! - Product snapshots with a time-to-live and respondent check
//! - Instrument status per access code
//! - Per-field answers while an instrument page is open
//!
//! Every operation degrades to a miss or a no-op when the backend is
//! unavailable. Storage problems never abort an orchestration run.
//!
//! # Example
//!
//! ```rust
//! use its123_store::{keys, MemoryBackend, PersistentStore};
//! use std::sync::Arc;
//!
//! let store = PersistentStore::new(Arc::new(MemoryBackend::new()));
//! store.set(&keys::instrument("I1"), "started");
//! assert_eq!(store.get("I1").as_deref(), Some("started"));
//! ```

#![warn(unreachable_pub)]

pub mod backend;
pub mod clock;
pub mod error;
pub mod keys;
pub mod store;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::StoreError;
pub use store::{CacheEntry, PersistentStore, DEFAULT_PRODUCT_TTL};
