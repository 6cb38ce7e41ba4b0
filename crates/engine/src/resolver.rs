// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolvers and the handle they use to publish values

use crate::instance::{DirectiveInstance, SlotId};
use async_trait::async_trait;
use rebus_core::{AttachedValue, Directive, ResolveError, Value, ValueId};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Work that attempts to satisfy a directive by adding values.
///
/// Returning `Ok(())` ends the resolver for good. Returning an error records
/// it against the instance; the resolver is invoked again the next time its
/// context is replaced. Errors returned after `token` is canceled are ignored.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(
        &self,
        token: CancellationToken,
        handle: ResolverHandle,
    ) -> Result<(), ResolveError>;
}

/// Capability handed to one resolver attempt
#[derive(Clone)]
pub struct ResolverHandle {
    instance: DirectiveInstance,
    slot: SlotId,
    generation: u64,
}

impl ResolverHandle {
    pub(crate) fn new(instance: DirectiveInstance, slot: SlotId, generation: u64) -> Self {
        Self {
            instance,
            slot,
            generation,
        }
    }

    pub fn instance(&self) -> &DirectiveInstance {
        &self.instance
    }

    pub fn directive(&self) -> &Arc<dyn Directive> {
        self.instance.directive()
    }

    /// Publish a value. Returns `None` if it was rejected (hard cap reached,
    /// resolver stopped, or instance disposed).
    pub fn add_value(&self, value: Value) -> Option<ValueId> {
        self.instance.add_value(self.slot, self.generation, value)
    }

    /// Remove a value previously added by this resolver
    pub fn remove_value(&self, id: ValueId) -> Option<AttachedValue> {
        self.instance.remove_value(self.slot, id)
    }

    /// Remove every value added by this resolver
    pub fn clear_values(&self) -> Vec<ValueId> {
        self.instance.clear_values(self.slot)
    }

    /// Declare this attempt idle (or busy again) without returning
    pub fn mark_idle(&self, idle: bool) {
        self.instance.mark_idle(self.slot, self.generation, idle);
    }

    /// Run `cb` once when the value is removed. Returns false if the value
    /// is not attached.
    pub fn add_value_removed_callback(
        &self,
        id: ValueId,
        cb: impl FnOnce(&AttachedValue) + Send + 'static,
    ) -> bool {
        self.instance
            .add_value_removed_callback(self.slot, id, Box::new(cb))
    }

    /// Run `cb` once when this resolver is removed from the instance
    pub fn add_resolver_removed_callback(&self, cb: impl FnOnce() + Send + 'static) -> bool {
        self.instance
            .add_resolver_removed_callback(self.slot, Box::new(cb))
    }
}

/// Adapter turning an async closure into a [`Resolver`]
pub struct FnResolver<F> {
    f: F,
}

impl<F, Fut> FnResolver<F>
where
    F: Fn(CancellationToken, ResolverHandle) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ResolveError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Resolver for FnResolver<F>
where
    F: Fn(CancellationToken, ResolverHandle) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ResolveError>> + Send,
{
    async fn resolve(
        &self,
        token: CancellationToken,
        handle: ResolverHandle,
    ) -> Result<(), ResolveError> {
        (self.f)(token, handle).await
    }
}
