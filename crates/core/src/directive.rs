// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directive model
//!
//! A directive is an immutable description of a desired outcome. The engine
//! merges equivalent directives into one live instance and lets a strictly
//! newer directive retire an older equivalent one.

use crate::error::BusError;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::time::Duration;

/// Debug key/value pairs describing a directive
pub type DebugValues = BTreeMap<String, Vec<String>>;

/// Value-handling options for a directive
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueOptions {
    /// Maximum number of concurrently attached values, 0 = unlimited
    pub max_value_count: usize,
    /// Reject values arriving past the cap instead of accepting them
    pub max_value_hard_cap: bool,
    /// How long to keep the instance after its last reference is released
    #[serde(with = "humantime_serde")]
    pub unref_dispose_dur: Duration,
    /// Skip the grace period if no reference ever attached or no values are held
    pub unref_dispose_empty_immediate: bool,
}

impl ValueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_value_count(mut self, count: usize) -> Self {
        self.max_value_count = count;
        self
    }

    pub fn with_hard_cap(mut self) -> Self {
        self.max_value_hard_cap = true;
        self
    }

    pub fn with_unref_dispose(mut self, dur: Duration) -> Self {
        self.unref_dispose_dur = dur;
        self
    }

    pub fn with_empty_immediate(mut self) -> Self {
        self.unref_dispose_empty_immediate = true;
        self
    }

    /// True if `count` attached values has reached the cap
    pub fn is_capped(&self, count: usize) -> bool {
        self.max_value_count != 0 && count >= self.max_value_count
    }
}

/// A caller's declared desired outcome.
///
/// Implementations compare against other directives through
/// [`downcast_ref`](trait.Directive.html#method.downcast_ref); a directive of a
/// different concrete type is never equivalent.
pub trait Directive: Any + Send + Sync {
    /// Short type name used for logging and debug info
    fn name(&self) -> &str;

    /// Check the directive before it is submitted
    fn validate(&self) -> Result<(), BusError> {
        Ok(())
    }

    fn value_options(&self) -> ValueOptions {
        ValueOptions::default()
    }

    /// True if `other` can be merged into the same instance
    fn is_equivalent(&self, other: &dyn Directive) -> bool;

    /// True if this directive is strictly newer than the equivalent `other`
    fn supersedes(&self, _other: &dyn Directive) -> bool {
        false
    }

    fn debug_values(&self) -> DebugValues {
        DebugValues::new()
    }
}

impl dyn Directive {
    /// Downcast to a concrete directive type
    pub fn downcast_ref<D: Directive>(&self) -> Option<&D> {
        let any: &dyn Any = self;
        any.downcast_ref::<D>()
    }

    /// Snapshot of the name and debug values
    pub fn info(&self) -> DirectiveInfo {
        DirectiveInfo {
            name: self.name().to_string(),
            debug_values: self.debug_values(),
        }
    }
}

/// Name and debug values of a directive, as reported to status readers
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveInfo {
    pub name: String,
    pub debug_values: DebugValues,
}

#[cfg(test)]
#[path = "directive_tests.rs"]
mod tests;
