//! Concurrency gate for outbound calls.
//!
//! A bounded semaphore: callers beyond the limit suspend in FIFO order until
//! a permit is released. The permit is an RAII value, so it goes back to the
//! gate on every exit path, including errors and cancellation.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Concurrency gate closed")]
pub struct GateClosed;

/// Process-wide bound on in-flight outbound calls.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    max_permits: usize,
}

impl ConcurrencyGate {
    pub fn new(max_permits: usize) -> Self {
        let max_permits = max_permits.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_permits)),
            max_permits,
        }
    }

    /// Wait for a permit. Fails only after [`ConcurrencyGate::close`].
    pub async fn acquire(&self) -> Result<GatePermit, GateClosed> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)?;

        metrics::record_outbound_in_flight(self.in_use());
        Ok(GatePermit {
            _permit: permit,
            gate: self.clone(),
        })
    }

    /// Stop handing out permits; waiting callers fail with [`GateClosed`].
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn in_use(&self) -> usize {
        self.max_permits - self.semaphore.available_permits()
    }

    pub fn max_permits(&self) -> usize {
        self.max_permits
    }
}

/// A held slot in the gate. Dropping it releases the slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    gate: ConcurrencyGate,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        // The semaphore permit is released after this body runs.
        metrics::record_outbound_in_flight(self.gate.in_use().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_third_caller_waits_for_release() {
        let gate = ConcurrencyGate::new(2);
        let first = gate.acquire().await.unwrap();
        let _second = gate.acquire().await.unwrap();
        assert_eq!(gate.in_use(), 2);

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished(), "third acquire must suspend");

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should proceed once a permit is released")
            .unwrap()
            .unwrap();
        assert_eq!(gate.in_use(), 1);
    }

    #[tokio::test]
    async fn test_close_fails_waiters() {
        let gate = ConcurrencyGate::new(1);
        let _held = gate.acquire().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        gate.close();
        assert_eq!(waiter.await.unwrap(), Err(GateClosed));
    }
}
