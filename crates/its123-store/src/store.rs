//! Fail-soft persistent store
//!
//! Wraps a [`StorageBackend`] and turns every backend failure into a miss.
//! The backend is probed once at construction; a backend that cannot take a
//! write is dropped and the store runs disabled from then on.

use crate::backend::StorageBackend;
use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default lifetime of a product snapshot
pub const DEFAULT_PRODUCT_TTL: Duration = Duration::from_secs(3600);

const PROBE_KEY: &str = "__its123_probe__";

/// Snapshot record with owner and write time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// Cached value
    pub value: T,
    /// Respondent the value was stored for (empty for anonymous)
    pub user: String,
    /// Write time
    pub stored_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Whether the entry may be served to `user` at `now`
    ///
    /// Valid while `now - stored_at < ttl` and the user matches exactly.
    #[must_use]
    pub fn is_valid(&self, user: &str, ttl: Duration, now: DateTime<Utc>) -> bool {
        // Clock skew can put stored_at in the future; treat that as age zero.
        let age = (now - self.stored_at).to_std().unwrap_or_default();
        self.user == user && age < ttl
    }
}

/// Key/value store that never fails its caller
#[derive(Debug, Clone)]
pub struct PersistentStore {
    backend: Option<Arc<dyn StorageBackend>>,
    clock: Arc<dyn Clock>,
}

impl PersistentStore {
    /// Create store over `backend` using the wall clock
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    /// Create store over `backend` with an explicit time source
    #[must_use]
    pub fn with_clock(backend: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>) -> Self {
        let backend = if probe(backend.as_ref()) {
            Some(backend)
        } else {
            tracing::warn!("storage backend failed probe, running without persistence");
            None
        };

        Self { backend, clock }
    }

    /// Store with no backend; every read misses
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            backend: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Whether a working backend is attached
    #[inline]
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Current time according to the store's clock
    #[inline]
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Store a raw value
    pub fn set(&self, key: &str, value: &str) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = backend.set(key, value) {
            tracing::debug!(key, error = %e, "store write failed");
        }
    }

    /// Read a raw value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let backend = self.backend.as_ref()?;
        match backend.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(key, error = %e, "store read failed");
                None
            }
        }
    }

    /// Delete a key
    pub fn remove(&self, key: &str) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = backend.remove(key) {
            tracing::debug!(key, error = %e, "store remove failed");
        }
    }

    /// Delete every key starting with `prefix`
    ///
    /// Returns the number of keys removed.
    pub fn remove_by_prefix(&self, prefix: &str) -> usize {
        let Some(backend) = &self.backend else {
            return 0;
        };

        let keys = match backend.keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::debug!(prefix, error = %e, "store key listing failed");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys.iter().filter(|k| k.starts_with(prefix)) {
            match backend.remove(key) {
                Ok(()) => removed += 1,
                Err(e) => tracing::debug!(key = %key, error = %e, "store remove failed"),
            }
        }
        removed
    }

    /// Persist `value` as a snapshot owned by `user`
    pub fn save_snapshot<T: Serialize>(&self, key: &str, value: &T, user: &str) {
        if !self.is_available() {
            return;
        }

        let entry = CacheEntry {
            value,
            user: user.to_string(),
            stored_at: self.clock.now(),
        };

        match serde_json::to_string(&entry) {
            Ok(json) => self.set(key, &json),
            Err(e) => tracing::debug!(key, error = %e, "snapshot serialization failed"),
        }
    }

    /// Load a snapshot for `user` that is younger than `ttl`
    ///
    /// Expired, foreign and undecodable snapshots are reported as absent.
    #[must_use]
    pub fn load_snapshot<T: DeserializeOwned>(
        &self,
        key: &str,
        user: &str,
        ttl: Duration,
    ) -> Option<T> {
        let raw = self.get(key)?;

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(key, error = %e, "discarding undecodable snapshot");
                return None;
            }
        };

        if entry.is_valid(user, ttl, self.clock.now()) {
            Some(entry.value)
        } else {
            tracing::debug!(key, "snapshot expired or owned by another user");
            None
        }
    }
}

fn probe(backend: &dyn StorageBackend) -> bool {
    backend.set(PROBE_KEY, PROBE_KEY).is_ok() && backend.remove(PROBE_KEY).is_ok()
}
