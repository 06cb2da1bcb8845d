//! Session existence and metadata.

use std::time::SystemTime;

use dashmap::DashMap;

/// Metadata kept for every known session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub created_at: SystemTime,
}

/// Storage for session records.
pub trait SessionStore: Send + Sync {
    /// Create the record if absent. Returns true when a record was created.
    fn ensure(&self, session_id: &str) -> bool;

    fn get(&self, session_id: &str) -> Option<SessionRecord>;

    /// Remove the record. Returns true when one existed.
    fn delete(&self, session_id: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local session store.
///
/// Records live until [`SessionStore::delete`] is called (DELETE on the
/// endpoint); nothing expires them. With auth disabled, every request that
/// omits the session header mints and stores a new record.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: DashMap<String, SessionRecord>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn ensure(&self, session_id: &str) -> bool {
        let mut created = false;
        self.inner.entry(session_id.to_string()).or_insert_with(|| {
            created = true;
            SessionRecord {
                created_at: SystemTime::now(),
            }
        });
        created
    }

    fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.inner.get(session_id).map(|r| r.value().clone())
    }

    fn delete(&self, session_id: &str) -> bool {
        self.inner.remove(session_id).is_some()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
