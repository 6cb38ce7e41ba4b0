// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolver supervision
//!
//! Each attached resolver gets one long-lived task that follows its slot
//! context: run an attempt while the context says `Run`, wait while it is
//! `Paused`, and exit on `Stopped`. An interrupted attempt is canceled and
//! awaited before the next one starts. Every attempt runs as its own task so a
//! panicking resolver is reported as a failure instead of taking the
//! supervisor down with it.

use crate::instance::{DirectiveInstance, SlotId};
use crate::panic::join_error_message;
use crate::resolver::{Resolver, ResolverHandle};
use rebus_core::ResolveError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// How long a canceled attempt may run before it is aborted
const STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub(crate) enum SlotCtx {
    Run {
        token: CancellationToken,
        generation: u64,
    },
    Paused,
    Stopped,
}

/// How a resolver attempt ended
#[derive(Debug)]
pub(crate) enum Outcome {
    Done,
    Failed(ResolveError),
    Canceled,
}

impl Outcome {
    pub(crate) fn classify(
        joined: Result<Result<(), ResolveError>, JoinError>,
        token: &CancellationToken,
    ) -> Self {
        match joined {
            Ok(Ok(())) => Outcome::Done,
            Ok(Err(_)) if token.is_cancelled() => Outcome::Canceled,
            Ok(Err(e)) if e.is_canceled() => Outcome::Canceled,
            Ok(Err(e)) => Outcome::Failed(e),
            Err(e) if e.is_cancelled() => Outcome::Canceled,
            Err(e) => Outcome::Failed(ResolveError::failed(format!(
                "resolver panicked: {}",
                join_error_message(e)
            ))),
        }
    }
}

enum Step {
    Finished(Outcome),
    Interrupted { alive: bool },
}

/// Start the supervisor task. Returns false when no runtime is available.
pub(crate) fn spawn(
    instance: DirectiveInstance,
    slot: SlotId,
    resolver: Arc<dyn Resolver>,
    rx: watch::Receiver<SlotCtx>,
) -> bool {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        return false;
    };
    let span = tracing::debug_span!(
        "resolver",
        directive = instance.directive().name(),
        instance = %instance.id(),
        slot = slot.0,
    );
    runtime.spawn(supervise(instance, slot, resolver, rx).instrument(span));
    true
}

async fn supervise(
    instance: DirectiveInstance,
    slot: SlotId,
    resolver: Arc<dyn Resolver>,
    mut rx: watch::Receiver<SlotCtx>,
) {
    loop {
        let ctx = rx.borrow_and_update().clone();
        let (token, generation) = match ctx {
            SlotCtx::Stopped => break,
            SlotCtx::Paused => {
                if rx.changed().await.is_err() {
                    break;
                }
                continue;
            }
            SlotCtx::Run { token, generation } => (token, generation),
        };

        tracing::trace!(generation, "attempt started");
        let handle = ResolverHandle::new(instance.clone(), slot, generation);
        let attempt_token = token.clone();
        let attempt_resolver = Arc::clone(&resolver);
        let mut attempt = tokio::spawn(
            async move { attempt_resolver.resolve(attempt_token, handle).await }.in_current_span(),
        );

        let step = tokio::select! {
            joined = &mut attempt => Step::Finished(Outcome::classify(joined, &token)),
            changed = rx.changed() => Step::Interrupted { alive: changed.is_ok() },
        };

        match step {
            Step::Finished(outcome) => {
                tracing::trace!(generation, ?outcome, "attempt ended");
                instance.end_attempt(slot, generation, outcome);
                if rx.changed().await.is_err() {
                    break;
                }
            }
            Step::Interrupted { alive } => {
                token.cancel();
                // The next attempt starts only after this one has wound down.
                if tokio::time::timeout(STOP_GRACE, &mut attempt).await.is_err() {
                    tracing::warn!(
                        generation,
                        grace = ?STOP_GRACE,
                        "attempt ignored cancellation, aborting"
                    );
                    attempt.abort();
                }
                if !alive {
                    break;
                }
            }
        }
    }
    tracing::trace!("resolver stopped");
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
