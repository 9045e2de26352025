//! # Session Store Module
//!
//! In-memory, per-user session state with time-based expiry. The store owns
//! every session; handler code only ever sees an `Arc<tokio::sync::Mutex>`
//! entry, so processing for one user key is fully serialized while
//! independent keys proceed in parallel.
//!
//! There is no durable backing: a process restart loses in-flight sessions.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::info;

/// State owned by a [`SessionStore`]. Implementors track their own activity
/// timestamp so the store can expire idle sessions.
pub trait SessionState: Default + Send {
    fn last_update(&self) -> DateTime<Utc>;
    fn touch(&mut self);
}

/// Keyed container of per-user sessions with passive expiry.
pub struct SessionStore<S> {
    sessions: StdMutex<HashMap<String, Arc<Mutex<S>>>>,
    timeout: Duration,
}

impl<S: SessionState> SessionStore<S> {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            sessions: StdMutex::new(HashMap::new()),
            timeout: Duration::seconds(timeout_secs as i64),
        }
    }

    /// Fetch the session for `key`, creating a fresh one if absent.
    pub fn get_or_create(&self, key: &str) -> Arc<Mutex<S>> {
        let mut sessions = self.sessions.lock().unwrap();
        Arc::clone(
            sessions
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(S::default()))),
        )
    }

    /// Destroy the session for `key`, if any.
    pub fn remove(&self, key: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.remove(key).is_some() {
            info!(key, "Session removed");
        }
    }

    /// Purge sessions idle for longer than the configured timeout.
    ///
    /// `current_key` is skipped so the sweep never interferes with the event
    /// being processed. Entries checked out by a handler (any live `Arc`
    /// handle besides the map's own, detected under the map lock so a
    /// concurrent `get_or_create` cannot race it) or whose lock is held are
    /// left alone, keeping the sweep non-blocking and never orphaning a
    /// session another task is about to mutate.
    pub fn sweep_expired(&self, current_key: &str) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().unwrap();

        let expired: Vec<String> = sessions
            .iter()
            .filter(|(key, _)| key.as_str() != current_key)
            .filter(|(_, entry)| Arc::strong_count(entry) == 1)
            .filter_map(|(key, entry)| {
                let session = entry.try_lock().ok()?;
                (now - session.last_update() > self.timeout).then(|| key.clone())
            })
            .collect();

        for key in &expired {
            sessions.remove(key);
            info!(key, "Expired session purged");
        }
        expired.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
