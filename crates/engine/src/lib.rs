// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rebus-engine: directive controller, instances and resolver supervision

mod controller;
mod handler;
mod instance;
pub mod panic;
mod reference;
mod resolver;
mod resolvers;
mod supervisor;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use controller::DirectiveController;
pub use handler::{DirectiveHandler, FnHandler, HandlerId};
pub use instance::{DirectiveInstance, InstanceId, InstanceInfo};
pub use reference::{CallbackRelease, FnReferenceHandler, Reference, ReferenceHandler};
pub use resolver::{FnResolver, Resolver, ResolverHandle};
pub use resolvers::{GetterResolver, ValueResolver};
