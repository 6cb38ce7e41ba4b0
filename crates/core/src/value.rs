// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Values attached to directive instances

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque payload satisfying a directive
pub type Value = Arc<dyn Any + Send + Sync>;

/// Wrap a concrete payload as a [`Value`]
pub fn into_value<T: Any + Send + Sync>(value: T) -> Value {
    Arc::new(value)
}

/// Identifier of a value within its owning instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value plus the identifier the engine assigned when accepting it
#[derive(Clone)]
pub struct AttachedValue {
    id: ValueId,
    value: Value,
}

impl AttachedValue {
    pub fn new(id: ValueId, value: Value) -> Self {
        Self { id, value }
    }

    pub fn id(&self) -> ValueId {
        self.id
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Typed view of the value, if it holds a `T`
    pub fn typed<T: Any + Clone>(&self) -> Option<TypedValue<T>> {
        self.downcast_ref::<T>().map(|v| TypedValue {
            id: self.id,
            value: v.clone(),
        })
    }
}

impl fmt::Debug for AttachedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachedValue")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// An attached value downcast to its concrete type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypedValue<T> {
    pub id: ValueId,
    pub value: T,
}

/// Hands out value identifiers, never reusing one that is still attached
#[derive(Debug, Clone)]
pub struct ValueIdAllocator {
    next: u32,
}

impl ValueIdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Allocate the next identifier for which `in_use` is false
    pub fn allocate(&mut self, in_use: impl Fn(ValueId) -> bool) -> ValueId {
        loop {
            let candidate = ValueId(self.next);
            self.next = match self.next.wrapping_add(1) {
                0 => 1,
                n => n,
            };
            if !in_use(candidate) {
                return candidate;
            }
        }
    }
}

impl Default for ValueIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
