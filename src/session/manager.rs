//! Session manager: owns the session store, per-process state, and the
//! cancellation registry, and is handed to request handlers by reference.

use std::sync::Arc;

use uuid::Uuid;

use crate::session::cancellation::CancellationRegistry;
use crate::session::state::{SessionState, SessionStateMap};
use crate::session::store::{MemorySessionStore, SessionStore};

/// Generate a new globally-unique opaque session id.
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    states: SessionStateMap,
    registry: Arc<CancellationRegistry>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            states: SessionStateMap::new(),
            registry: Arc::new(CancellationRegistry::new()),
        }
    }

    /// Manager backed by the in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStore::new()))
    }

    /// Create the session record if absent.
    pub fn ensure(&self, session_id: &str) {
        if self.store.ensure(session_id) {
            tracing::debug!(session_id = %session_id, "Session created");
        }
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.store.get(session_id).is_some()
    }

    pub fn state(&self, session_id: &str) -> Option<SessionState> {
        self.states.get(session_id)
    }

    pub fn update_state<F>(&self, session_id: &str, f: F)
    where
        F: FnOnce(&mut SessionState),
    {
        self.states.update(session_id, f);
    }

    pub fn registry(&self) -> &Arc<CancellationRegistry> {
        &self.registry
    }

    /// Forget a session: drop its record and protocol state and signal every
    /// request still in flight on it. Returns whether the session existed.
    pub fn evict(&self, session_id: &str) -> bool {
        let cancelled = self.registry.cancel_session(session_id);
        self.states.remove(session_id);
        let existed = self.store.delete(session_id);
        tracing::info!(session_id = %session_id, cancelled, existed, "Session evicted");
        existed
    }

    pub fn session_count(&self) -> usize {
        self.store.len()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.store.len())
            .field("in_flight", &self.registry.in_flight())
            .finish()
    }
}
