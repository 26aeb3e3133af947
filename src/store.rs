//! In-memory session registry with per-session locking.
//!
//! The outer map lock is held only long enough to look an entry up; each
//! session sits behind its own `tokio::sync::Mutex`, so turn appends and
//! finalization serialize per session while unrelated sessions proceed
//! concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::models::session::Session;
use crate::{AppError, Result};

/// Shared handle to one session's locked state.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Registry of active sessions, keyed by session id.
#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session and return its id.
    pub async fn insert(&self, session: Session) -> String {
        let id = session.id.clone();
        let mut map = self.inner.write().await;
        map.insert(id.clone(), Arc::new(Mutex::new(session)));
        id
    }

    /// Look up the lock handle for a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no session with that id exists.
    pub async fn get(&self, session_id: &str) -> Result<SessionHandle> {
        let map = self.inner.read().await;
        map.get(session_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))
    }

    /// Remove a session from the registry, returning its handle.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no session with that id exists.
    pub async fn remove(&self, session_id: &str) -> Result<SessionHandle> {
        let mut map = self.inner.write().await;
        map.remove(session_id)
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))
    }

    /// Ids of all registered sessions.
    pub async fn ids(&self) -> Vec<String> {
        let map = self.inner.read().await;
        map.keys().cloned().collect()
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        let map = self.inner.read().await;
        map.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
