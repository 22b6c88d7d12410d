use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::Session;

/// Process-wide mapping from session key to session.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a session for the given session key. Concurrent
    /// callers with the same key receive the same instance.
    pub fn get_or_create(&self, session_key: &str) -> Arc<Session> {
        let mut sessions = self.sessions.write().unwrap();
        Arc::clone(sessions.entry(session_key.to_string()).or_insert_with(|| {
            tracing::info!("Creating new session: {}", session_key);
            Arc::new(Session::new(session_key))
        }))
    }

    /// Get a session by its key. Never creates.
    pub fn get(&self, session_key: &str) -> Option<Arc<Session>> {
        self.sessions.read().unwrap().get(session_key).cloned()
    }

    /// Remove a session. Idempotent.
    pub fn remove(&self, session_key: &str) {
        if self.sessions.write().unwrap().remove(session_key).is_some() {
            tracing::info!("Removed session: {}", session_key);
        }
    }

    /// Snapshot of all active session keys.
    pub fn active_keys(&self) -> HashSet<String> {
        self.sessions.read().unwrap().keys().cloned().collect()
    }

    /// Remove expired sessions. Safe to invoke at any time; in-flight
    /// requests keep working against their already-resolved references.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .sessions
            .read()
            .unwrap()
            .iter()
            .filter(|(_, session)| session.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
            tracing::info!("Cleaned up expired session: {}", key);
        }

        if !expired.is_empty() {
            tracing::info!("Cleaned up {} expired sessions", expired.len());
        }
        expired.len()
    }

    /// Spawn the periodic sweep task.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.sweep();
            }
        })
    }
}
