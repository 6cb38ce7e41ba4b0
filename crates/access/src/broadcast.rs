// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared state with a replaced wake signal

use rebus_core::BusError;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

struct Inner<S> {
    state: S,
    /// Canceled and replaced on every update
    wake: CancellationToken,
}

/// State guarded by a lock, plus a signal that wakes every waiter whenever
/// the state is updated.
///
/// Waiters capture the current signal while holding the lock, so an update
/// between the predicate check and the wait is never missed.
pub struct Broadcast<S> {
    inner: Mutex<Inner<S>>,
}

impl<S: Default> Default for Broadcast<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S> Broadcast<S> {
    pub fn new(state: S) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state,
                wake: CancellationToken::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mutate the state and wake every waiter
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut inner = self.lock();
        let out = f(&mut inner.state);
        let wake = std::mem::replace(&mut inner.wake, CancellationToken::new());
        wake.cancel();
        out
    }

    /// Read the state without waking anyone
    pub fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.lock().state)
    }

    /// Wait until `check` returns `Some`.
    ///
    /// `check` runs under the lock, once up front and again after every
    /// update. Cancellation of `token` wins over a ready result.
    pub async fn wait<R>(
        &self,
        token: &CancellationToken,
        mut check: impl FnMut(&S) -> Option<R>,
    ) -> Result<R, BusError> {
        loop {
            if token.is_cancelled() {
                return Err(BusError::Canceled);
            }
            let wake = {
                let inner = self.lock();
                if let Some(out) = check(&inner.state) {
                    return Ok(out);
                }
                inner.wake.clone()
            };
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(BusError::Canceled),
                _ = wake.cancelled() => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "broadcast_tests.rs"]
mod tests;
