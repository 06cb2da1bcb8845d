//! Per-process protocol state for each session.

use dashmap::DashMap;

/// Protocol-level data negotiated on a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Version agreed during `initialize`.
    pub protocol_version: Option<String>,
    /// Set once the client sends `notifications/initialized`.
    pub initialized: bool,
    /// Client name reported during `initialize`, for logs.
    pub client_name: Option<String>,
}

/// In-memory map of session id to protocol state.
#[derive(Debug, Default)]
pub struct SessionStateMap {
    inner: DashMap<String, SessionState>,
}

impl SessionStateMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionState> {
        self.inner.get(session_id).map(|r| r.value().clone())
    }

    pub fn set(&self, session_id: &str, state: SessionState) {
        self.inner.insert(session_id.to_string(), state);
    }

    /// Mutate the state in place, creating a default entry first if needed.
    pub fn update<F>(&self, session_id: &str, f: F)
    where
        F: FnOnce(&mut SessionState),
    {
        let mut entry = self.inner.entry(session_id.to_string()).or_default();
        f(entry.value_mut());
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionState> {
        self.inner.remove(session_id).map(|(_, state)| state)
    }
}
