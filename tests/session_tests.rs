//! Session store behaviour: per-key identity, removal and the passive
//! expiry sweep.

use chrono::{Duration, Utc};

use mipgen::session::{SessionState, SessionStore};
use mipgen::telegram_flow::TelegramSession;

#[test]
fn test_get_or_create_returns_same_entry_per_key() {
    let store: SessionStore<TelegramSession> = SessionStore::new(3600);

    let a = store.get_or_create("123");
    let b = store.get_or_create("123");
    let c = store.get_or_create("456");

    assert!(std::sync::Arc::ptr_eq(&a, &b));
    assert!(!std::sync::Arc::ptr_eq(&a, &c));
    assert_eq!(store.len(), 2);
}

#[test]
fn test_remove_destroys_session() {
    let store: SessionStore<TelegramSession> = SessionStore::new(3600);
    store.get_or_create("123");
    assert!(store.contains("123"));

    store.remove("123");
    assert!(!store.contains("123"));
    assert!(store.is_empty());
}

#[test]
fn test_sweep_purges_only_idle_sessions() {
    let store: SessionStore<TelegramSession> = SessionStore::new(3600);

    let stale = store.get_or_create("stale");
    stale.try_lock().unwrap().last_update = Utc::now() - Duration::seconds(7200);
    drop(stale);

    let fresh = store.get_or_create("fresh");
    fresh.try_lock().unwrap().touch();
    drop(fresh);

    let purged = store.sweep_expired("fresh");
    assert_eq!(purged, 1);
    assert!(!store.contains("stale"));
    assert!(store.contains("fresh"));
}

#[test]
fn test_sweep_skips_checked_out_sessions() {
    let store: SessionStore<TelegramSession> = SessionStore::new(3600);

    // A handler has fetched the entry but not locked it yet.
    let handle = store.get_or_create("reviving");
    handle.try_lock().unwrap().last_update = Utc::now() - Duration::seconds(7200);

    assert_eq!(store.sweep_expired("someone-else"), 0);
    assert!(store.contains("reviving"));

    // Once the handler lets go the entry is fair game again.
    drop(handle);
    assert_eq!(store.sweep_expired("someone-else"), 1);
    assert!(!store.contains("reviving"));
}

#[test]
fn test_sweep_skips_the_session_being_processed() {
    let store: SessionStore<TelegramSession> = SessionStore::new(3600);

    let current = store.get_or_create("current");
    current.try_lock().unwrap().last_update = Utc::now() - Duration::seconds(7200);
    drop(current);

    let purged = store.sweep_expired("current");
    assert_eq!(purged, 0);
    assert!(store.contains("current"));
}

#[test]
fn test_sweep_skips_locked_entries() {
    let store: SessionStore<TelegramSession> = SessionStore::new(3600);

    let busy = store.get_or_create("busy");
    {
        let mut guard = busy.try_lock().unwrap();
        guard.last_update = Utc::now() - Duration::seconds(7200);
        drop(guard);
    }

    // Hold the lock while sweeping from another key's perspective.
    let _guard = busy.try_lock().unwrap();
    let purged = store.sweep_expired("someone-else");
    assert_eq!(purged, 0);
    assert!(store.contains("busy"));
}

#[test]
fn test_sessions_within_timeout_survive() {
    let store: SessionStore<TelegramSession> = SessionStore::new(3600);

    let recent = store.get_or_create("recent");
    recent.try_lock().unwrap().last_update = Utc::now() - Duration::seconds(600);
    drop(recent);

    assert_eq!(store.sweep_expired("other"), 0);
    assert!(store.contains("recent"));
}
