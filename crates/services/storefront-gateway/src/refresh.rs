//! Session refresh coordination.
//!
//! A 401 on an ordinary call leads to at most one refresh and one replay of
//! that call. With deduplication enabled, concurrent 401s share a single
//! refresh in flight instead of each issuing their own.
//!
//! A shared refresh runs on its own task and clears the in-flight slot when it
//! completes, so it finishes even if every waiter is dropped, and the next
//! expiry always starts a new refresh.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::error::{GatewayError, NetworkFailure};

/// Outcome of one refresh attempt, shared by every waiter
pub(crate) type RefreshResult = Result<(), GatewayError>;

type InFlight = Shared<BoxFuture<'static, RefreshResult>>;
type Slot = Arc<Mutex<Option<InFlight>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<InFlight>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Hands out the refresh in flight, or starts one.
pub(crate) struct RefreshCoordinator {
    dedup: bool,
    in_flight: Slot,
}

impl RefreshCoordinator {
    pub(crate) fn new(dedup: bool) -> Self {
        Self {
            dedup,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) const fn dedup(&self) -> bool {
        self.dedup
    }

    /// Awaits a refresh, starting one with `start` if none is in flight.
    ///
    /// Dropping the returned future only stops this waiter; a shared refresh
    /// keeps running for the others.
    pub(crate) async fn run<F>(&self, start: F) -> RefreshResult
    where
        F: FnOnce() -> BoxFuture<'static, RefreshResult>,
    {
        if !self.dedup {
            return start().await;
        }

        let shared = {
            let mut slot = lock(&self.in_flight);
            if let Some(existing) = slot.as_ref() {
                tracing::debug!("joining session refresh already in flight");
                existing.clone()
            } else {
                let fresh = Self::spawn(start(), Arc::clone(&self.in_flight));
                *slot = Some(fresh.clone());
                fresh
            }
        };

        shared.await
    }

    /// Drives `refresh` on its own task. The task clears `slot` before its
    /// result is published; it cannot run ahead of the caller installing the
    /// future because both sides take the same lock.
    fn spawn(refresh: BoxFuture<'static, RefreshResult>, slot: Slot) -> InFlight {
        let task = tokio::spawn(async move {
            let result = refresh.await;
            *lock(&slot) = None;
            result
        });

        async move {
            task.await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "session refresh task did not complete");
                Err(GatewayError::network(NetworkFailure::Unknown))
            })
        }
        .boxed()
        .shared()
    }

    #[cfg(test)]
    fn is_in_flight(&self) -> bool {
        lock(&self.in_flight).is_some()
    }
}
