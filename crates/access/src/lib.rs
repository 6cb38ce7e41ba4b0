// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rebus-access: call/return helpers over the callback-based engine
//!
//! Every helper here is built on [`Broadcast`]: shared state guarded by a
//! lock plus a wake signal replaced on each update.

mod broadcast;
mod exec;
mod refcount;
mod transform;
mod watch;

pub use broadcast::Broadcast;
pub use exec::{
    exec_collect_values, exec_one_off, exec_wait_idle, CollectOptions, Collected, OneOff,
    OneOffOptions,
};
pub use refcount::{DirectiveRefCount, KeyedRef, KeyedRefCount};
pub use transform::TransformResolver;
pub use watch::{watch_effect, DirectiveWatcher};
