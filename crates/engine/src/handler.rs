// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directive handlers
//!
//! A handler is offered every live directive and answers with the resolvers
//! it can contribute, or an empty list if it is not interested.

use crate::instance::DirectiveInstance;
use crate::resolver::Resolver;
use rebus_core::BusError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier assigned to a handler when it is registered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandlerId(pub u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Offered every directive; returns the resolvers it contributes.
///
/// Called synchronously during dispatch, so implementations decide quickly
/// and leave the actual work to the returned resolvers.
pub trait DirectiveHandler: Send + Sync {
    fn handle_directive(
        &self,
        instance: &DirectiveInstance,
    ) -> Result<Vec<Arc<dyn Resolver>>, BusError>;
}

/// Adapter turning a closure into a [`DirectiveHandler`]
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&DirectiveInstance) -> Result<Vec<Arc<dyn Resolver>>, BusError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> DirectiveHandler for FnHandler<F>
where
    F: Fn(&DirectiveInstance) -> Result<Vec<Arc<dyn Resolver>>, BusError> + Send + Sync,
{
    fn handle_directive(
        &self,
        instance: &DirectiveInstance,
    ) -> Result<Vec<Arc<dyn Resolver>>, BusError> {
        (self.f)(instance)
    }
}
