//! Registry of in-flight requests and their cancellation handles.
//!
//! An entry exists iff its request is in flight: [`CancellationRegistry::register`]
//! inserts it and hands back an [`InFlightGuard`] whose `Drop` removes it.
//! Because the guard is the only remover, the entry is removed exactly once
//! on success, error, cancellation, or panic unwinding.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::rpc::RequestId;

type Key = (String, RequestId);

/// A request with the same id is already in flight on this session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Request id {request_id} is already in flight")]
pub struct DuplicateRequest {
    pub request_id: RequestId,
}

/// Process-wide map of `(session id, request id)` to cancellation handle.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    entries: DashMap<Key, CancellationToken>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request as in flight.
    pub fn register(
        self: &Arc<Self>,
        session_id: &str,
        request_id: &RequestId,
    ) -> Result<InFlightGuard, DuplicateRequest> {
        let key = (session_id.to_string(), request_id.clone());
        let token = match self.entries.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(DuplicateRequest {
                    request_id: request_id.clone(),
                })
            }
            Entry::Vacant(slot) => slot.insert(CancellationToken::new()).value().clone(),
        };

        Ok(InFlightGuard {
            registry: Arc::clone(self),
            key,
            token,
        })
    }

    /// Signal the in-flight request. Unknown or finished requests are a no-op;
    /// returns whether a handle was found.
    pub fn cancel(&self, session_id: &str, request_id: &RequestId) -> bool {
        let token = self
            .entries
            .get(&(session_id.to_string(), request_id.clone()))
            .map(|r| r.value().clone());

        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Signal every in-flight request of one session. Returns how many were signalled.
    pub fn cancel_session(&self, session_id: &str) -> usize {
        let tokens: Vec<CancellationToken> = self
            .entries
            .iter()
            .filter(|r| r.key().0 == session_id)
            .map(|r| r.value().clone())
            .collect();
        for token in &tokens {
            token.cancel();
        }
        tokens.len()
    }

    /// Signal every in-flight request in the process. Used at shutdown.
    pub fn cancel_all(&self) -> usize {
        let tokens: Vec<CancellationToken> = self.entries.iter().map(|r| r.value().clone()).collect();
        for token in &tokens {
            token.cancel();
        }
        tokens.len()
    }

    pub fn contains(&self, session_id: &str, request_id: &RequestId) -> bool {
        self.entries
            .contains_key(&(session_id.to_string(), request_id.clone()))
    }

    /// Number of in-flight requests across all sessions.
    pub fn in_flight(&self) -> usize {
        self.entries.len()
    }
}

/// Scoped registration of one in-flight request.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<CancellationRegistry>,
    key: Key,
    token: CancellationToken,
}

impl InFlightGuard {
    /// Handle observed by the handler and the outbound executor.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn request_id(&self) -> &RequestId {
        &self.key.1
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.entries.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_lives_exactly_as_long_as_guard() {
        let registry = Arc::new(CancellationRegistry::new());
        let id = RequestId::from(1);

        let guard = registry.register("s1", &id).unwrap();
        assert!(registry.contains("s1", &id));
        assert_eq!(registry.in_flight(), 1);

        drop(guard);
        assert!(!registry.contains("s1", &id));
        assert_eq!(registry.in_flight(), 0);
    }

    #[test]
    fn test_duplicate_in_flight_id_rejected() {
        let registry = Arc::new(CancellationRegistry::new());
        let id = RequestId::from("abc");

        let _guard = registry.register("s1", &id).unwrap();
        assert_eq!(
            registry.register("s1", &id).unwrap_err(),
            DuplicateRequest { request_id: id.clone() }
        );
        // Same id on another session is independent.
        let _other = registry.register("s2", &id).unwrap();
        assert_eq!(registry.in_flight(), 2);
    }

    #[test]
    fn test_cancel_signals_without_removing() {
        let registry = Arc::new(CancellationRegistry::new());
        let id = RequestId::from(9);
        let guard = registry.register("s1", &id).unwrap();

        assert!(registry.cancel("s1", &id));
        assert!(guard.token().is_cancelled());
        assert!(registry.contains("s1", &id));

        drop(guard);
        assert!(!registry.cancel("s1", &id));
    }

    #[test]
    fn test_cancel_unknown_is_noop() {
        let registry = Arc::new(CancellationRegistry::new());
        let guard = registry.register("s1", &RequestId::from(1)).unwrap();

        assert!(!registry.cancel("s1", &RequestId::from(2)));
        assert!(!registry.cancel("s2", &RequestId::from(1)));
        assert!(!guard.token().is_cancelled());
    }

    #[test]
    fn test_cancel_session_is_scoped() {
        let registry = Arc::new(CancellationRegistry::new());
        let a = registry.register("s1", &RequestId::from(1)).unwrap();
        let b = registry.register("s1", &RequestId::from(2)).unwrap();
        let c = registry.register("s2", &RequestId::from(1)).unwrap();

        assert_eq!(registry.cancel_session("s1"), 2);
        assert!(a.token().is_cancelled());
        assert!(b.token().is_cancelled());
        assert!(!c.token().is_cancelled());

        assert_eq!(registry.cancel_all(), 3);
        assert!(c.token().is_cancelled());
    }

    #[test]
    fn test_entry_removed_when_task_panics() {
        let registry = Arc::new(CancellationRegistry::new());
        let reg = Arc::clone(&registry);
        let result = std::thread::spawn(move || {
            let _guard = reg.register("s1", &RequestId::from(1)).unwrap();
            panic!("handler blew up");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(registry.in_flight(), 0);
    }
}
