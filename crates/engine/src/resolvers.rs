// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stock resolvers

use crate::resolver::{Resolver, ResolverHandle};
use async_trait::async_trait;
use rebus_core::{into_value, ResolveError, Value};
use std::any::Any;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Adds a fixed set of values, then finishes.
///
/// Stops early once its context is canceled.
pub struct ValueResolver {
    values: Vec<Value>,
}

impl ValueResolver {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn single<T: Any + Send + Sync>(value: T) -> Self {
        Self::new(vec![into_value(value)])
    }
}

#[async_trait]
impl Resolver for ValueResolver {
    async fn resolve(
        &self,
        token: CancellationToken,
        handle: ResolverHandle,
    ) -> Result<(), ResolveError> {
        for value in &self.values {
            // Canceled once the value cap is reached.
            if token.is_cancelled() || handle.add_value(value.clone()).is_none() {
                break;
            }
        }
        Ok(())
    }
}

/// Calls an async getter and adds its result as a single value.
///
/// A getter returning `Ok(None)` finishes without adding anything.
pub struct GetterResolver<F> {
    getter: F,
}

impl<F, Fut, T> GetterResolver<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<T>, ResolveError>> + Send,
    T: Any + Send + Sync,
{
    pub fn new(getter: F) -> Self {
        Self { getter }
    }
}

#[async_trait]
impl<F, Fut, T> Resolver for GetterResolver<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<T>, ResolveError>> + Send,
    T: Any + Send + Sync,
{
    async fn resolve(
        &self,
        token: CancellationToken,
        handle: ResolverHandle,
    ) -> Result<(), ResolveError> {
        let value = tokio::select! {
            _ = token.cancelled() => return Err(ResolveError::Canceled),
            result = (self.getter)(token.clone()) => result?,
        };
        if let Some(value) = value {
            handle.add_value(into_value(value));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "resolvers_tests.rs"]
mod tests;
