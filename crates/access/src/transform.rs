// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolving a directive from another directive's values

use async_trait::async_trait;
use rebus_core::{AttachedValue, Directive, ResolveError, Value, ValueId};
use rebus_engine::{DirectiveController, DirectiveInstance, ReferenceHandler, Resolver, ResolverHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Resolver that submits a sub-directive and republishes each of its values,
/// mapped through `transform`, on the directive being resolved.
///
/// Values removed from the sub-directive are removed from the parent. The
/// parent is idle while the sub-directive is idle. If the sub-directive goes
/// idle with errors, the attempt fails with the first of them. A value the
/// transform maps to `None` is skipped.
pub struct TransformResolver<F> {
    controller: DirectiveController,
    directive: Arc<dyn Directive>,
    transform: Arc<F>,
}

impl<F> TransformResolver<F>
where
    F: Fn(&AttachedValue) -> Option<Value> + Send + Sync + 'static,
{
    pub fn new(controller: DirectiveController, directive: Arc<dyn Directive>, transform: F) -> Self {
        Self {
            controller,
            directive,
            transform: Arc::new(transform),
        }
    }
}

/// Forwards sub-directive values into the parent resolver's handle
struct Forward<F> {
    handle: ResolverHandle,
    transform: Arc<F>,
    /// Sub-directive value id to parent value id
    mapped: Mutex<HashMap<ValueId, ValueId>>,
}

impl<F> ReferenceHandler for Forward<F>
where
    F: Fn(&AttachedValue) -> Option<Value> + Send + Sync + 'static,
{
    fn handle_value_added(&self, instance: &DirectiveInstance, value: &AttachedValue) {
        if !instance.is_idle() {
            self.handle.mark_idle(false);
        }
        let Some(mapped) = (self.transform)(value) else {
            return;
        };
        if let Some(id) = self.handle.add_value(mapped) {
            self.mapped
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(value.id(), id);
        }
    }

    fn handle_value_removed(&self, _instance: &DirectiveInstance, value: &AttachedValue) {
        let removed = self
            .mapped
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&value.id());
        if let Some(id) = removed {
            self.handle.remove_value(id);
        }
    }

    fn handle_instance_disposed(&self, _instance: &DirectiveInstance) {}
}

#[async_trait]
impl<F> Resolver for TransformResolver<F>
where
    F: Fn(&AttachedValue) -> Option<Value> + Send + Sync + 'static,
{
    async fn resolve(
        &self,
        token: CancellationToken,
        handle: ResolverHandle,
    ) -> Result<(), ResolveError> {
        // Values from a previous attempt belong to a reference that is gone.
        handle.clear_values();

        let forward = Forward {
            handle: handle.clone(),
            transform: Arc::clone(&self.transform),
            mapped: Mutex::new(HashMap::new()),
        };
        let (sub, reference) = self
            .controller
            .add_directive(Arc::clone(&self.directive), Arc::new(forward))
            .map_err(ResolveError::failed)?;
        tracing::debug!(
            parent = %handle.instance().id(),
            sub = %sub.id(),
            directive = sub.directive().name(),
            "transform subscribed"
        );

        let (failed_tx, mut failed) = mpsc::unbounded_channel();
        let idle_handle = handle.clone();
        let idle = sub.add_idle_callback(move |errs| match errs.first() {
            Some(err) => {
                let _ = failed_tx.send(err.clone());
            }
            None => idle_handle.mark_idle(true),
        });

        let result = tokio::select! {
            _ = token.cancelled() => Err(ResolveError::Canceled),
            Some(err) = failed.recv() => {
                tracing::debug!(
                    parent = %handle.instance().id(),
                    sub = %sub.id(),
                    error = %err,
                    "sub-directive failed"
                );
                Err(err)
            }
            _ = sub.token().cancelled() => Err(ResolveError::failed(format!(
                "sub-directive {} disposed",
                sub.directive().name()
            ))),
        };
        idle.release();
        reference.release();
        result
    }
}

#[cfg(test)]
#[path = "transform_tests.rs"]
mod tests;
