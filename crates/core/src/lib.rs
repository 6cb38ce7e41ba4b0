// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rebus-core: directive model for the rebus coordination engine
//!
//! This crate provides:
//! - The `Directive` contract (validation, equivalence, supersession, value options)
//! - Value types attached to directive instances
//! - The shared error taxonomy
//! - Engine and bus configuration

pub mod config;
pub mod directive;
pub mod error;
pub mod value;

pub use config::{BusConfig, ConfigError, EngineConfig, RebusConfig};
pub use directive::{DebugValues, Directive, DirectiveInfo, ValueOptions};
pub use error::{BusError, ResolveError};
pub use value::{into_value, AttachedValue, TypedValue, Value, ValueId, ValueIdAllocator};
