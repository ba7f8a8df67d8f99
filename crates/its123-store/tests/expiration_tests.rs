//! Snapshot expiration properties
//!
//! An entry written at T with ttl D must be served for reads before T+D and
//! reported absent from T+D on.

use chrono::Duration as ChronoDuration;
use its123_store::{FileBackend, ManualClock, MemoryBackend, PersistentStore};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn fresh_store() -> (PersistentStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let store = PersistentStore::with_clock(Arc::new(MemoryBackend::new()), clock.clone());
    (store, clock)
}

proptest! {
    #[test]
    fn prop_snapshot_absent_at_or_after_ttl(ttl_secs in 1u64..100_000, extra in 0u64..100_000) {
        let (store, clock) = fresh_store();
        store.save_snapshot("P1", &"product", "u1");

        let elapsed = i64::try_from(ttl_secs + extra).unwrap();
        clock.advance(ChronoDuration::seconds(elapsed));

        let loaded = store.load_snapshot::<String>("P1", "u1", Duration::from_secs(ttl_secs));
        prop_assert!(loaded.is_none());
    }

    #[test]
    fn prop_snapshot_present_before_ttl(ttl_secs in 2u64..100_000, fraction in 0.0f64..1.0) {
        let (store, clock) = fresh_store();
        store.save_snapshot("P1", &"product", "u1");

        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
        let elapsed = ((ttl_secs - 1) as f64 * fraction) as i64;
        clock.advance(ChronoDuration::seconds(elapsed));

        let loaded = store.load_snapshot::<String>("P1", "u1", Duration::from_secs(ttl_secs));
        prop_assert_eq!(loaded.as_deref(), Some("product"));
    }
}

#[test]
fn file_store_resumes_unexpired_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("its123.json");
    let clock = Arc::new(ManualClock::default());

    {
        let backend = Arc::new(FileBackend::open(&path).unwrap());
        let store = PersistentStore::with_clock(backend, clock.clone());
        store.save_snapshot("P1", &vec!["I1".to_string()], "u1");
        store.set("I1", "in-progress");
    }

    clock.advance(ChronoDuration::minutes(10));

    let backend = Arc::new(FileBackend::open(&path).unwrap());
    let store = PersistentStore::with_clock(backend, clock);
    let instruments: Option<Vec<String>> =
        store.load_snapshot("P1", "u1", Duration::from_secs(3600));
    assert_eq!(instruments, Some(vec!["I1".to_string()]));
    assert_eq!(store.get("I1").as_deref(), Some("in-progress"));
}
