// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Following the latest value of a directive

use crate::broadcast::Broadcast;
use rebus_core::{AttachedValue, BusError, Directive, TypedValue};
use rebus_engine::{DirectiveController, DirectiveInstance, Reference, ReferenceHandler};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct WatchState<V> {
    /// Attached values of type `V`, in accept order
    values: Vec<TypedValue<V>>,
    /// Bumped whenever the latest value changes
    version: u64,
    disposed: bool,
}

impl<V> WatchState<V> {
    fn latest_id(&self) -> Option<rebus_core::ValueId> {
        self.values.last().map(|v| v.id)
    }
}

struct WatchHandler<V> {
    cell: Arc<Broadcast<WatchState<V>>>,
}

impl<V: Any + Clone + Send + Sync> ReferenceHandler for WatchHandler<V> {
    fn handle_value_added(&self, _instance: &DirectiveInstance, value: &AttachedValue) {
        let Some(typed) = value.typed::<V>() else {
            return;
        };
        self.cell.update(|st| {
            st.values.push(typed);
            st.version += 1;
        });
    }

    fn handle_value_removed(&self, _instance: &DirectiveInstance, value: &AttachedValue) {
        self.cell.update(|st| {
            let before = st.latest_id();
            st.values.retain(|v| v.id != value.id());
            if st.latest_id() != before {
                st.version += 1;
            }
        });
    }

    fn handle_instance_disposed(&self, _instance: &DirectiveInstance) {
        self.cell.update(|st| st.disposed = true);
    }
}

/// Holds a reference to a directive and tracks its most recent value of
/// type `V`
pub struct DirectiveWatcher<V> {
    cell: Arc<Broadcast<WatchState<V>>>,
    instance: DirectiveInstance,
    reference: Reference,
}

impl<V: Any + Clone + Send + Sync> DirectiveWatcher<V> {
    pub fn start(
        controller: &DirectiveController,
        directive: Arc<dyn Directive>,
    ) -> Result<Self, BusError> {
        let cell = Arc::new(Broadcast::new(WatchState {
            values: Vec::new(),
            version: 0,
            disposed: false,
        }));
        let handler = WatchHandler {
            cell: Arc::clone(&cell),
        };
        let (instance, reference) = controller.add_directive(directive, Arc::new(handler))?;
        Ok(Self {
            cell,
            instance,
            reference,
        })
    }

    pub fn instance(&self) -> &DirectiveInstance {
        &self.instance
    }

    /// Most recently added value still attached
    pub fn current(&self) -> Option<TypedValue<V>> {
        self.cell.with(|st| st.values.last().cloned())
    }

    pub fn version(&self) -> u64 {
        self.cell.with(|st| st.version)
    }

    /// Wait until the latest value differs from `seen`, returning the new
    /// version and value. `None` means every value was removed.
    pub async fn wait_change(
        &self,
        token: &CancellationToken,
        seen: u64,
    ) -> Result<(u64, Option<TypedValue<V>>), BusError> {
        self.cell
            .wait(token, |st| {
                if st.version != seen {
                    return Some(Ok((st.version, st.values.last().cloned())));
                }
                if st.disposed {
                    return Some(Err(BusError::DirectiveDisposed));
                }
                None
            })
            .await
            .and_then(|r| r)
    }

    /// Drop the reference held on the directive
    pub fn release(&self) {
        self.reference.release();
    }
}

/// Run `effect` for the watcher's latest value, restarting it whenever the
/// value changes.
///
/// The previous run's token is canceled before the next run starts, and no
/// run is active while there is no value. Returns when `token` is canceled
/// ([`BusError::Canceled`]) or the directive is disposed.
pub async fn watch_effect<V, F, Fut>(
    watcher: &DirectiveWatcher<V>,
    token: &CancellationToken,
    effect: F,
) -> BusError
where
    V: Any + Clone + Send + Sync,
    F: Fn(TypedValue<V>, CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (mut seen, current) = watcher
        .cell
        .with(|st| (st.version, st.values.last().cloned()));
    let mut running = current.map(|value| start_effect(&effect, value, token));
    let err = loop {
        match watcher.wait_change(token, seen).await {
            Ok((version, latest)) => {
                seen = version;
                if let Some(previous) = running.take() {
                    previous.cancel();
                }
                if let Some(value) = latest {
                    tracing::trace!(value_id = %value.id, "latest value changed, restarting effect");
                    running = Some(start_effect(&effect, value, token));
                }
            }
            Err(e) => break e,
        }
    };
    if let Some(previous) = running {
        previous.cancel();
    }
    err
}

fn start_effect<V, F, Fut>(
    effect: &F,
    value: TypedValue<V>,
    parent: &CancellationToken,
) -> CancellationToken
where
    F: Fn(TypedValue<V>, CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let token = parent.child_token();
    tokio::spawn(effect(value, token.clone()));
    token
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
