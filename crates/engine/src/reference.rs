// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! References held by callers on directive instances

use crate::instance::DirectiveInstance;
use rebus_core::AttachedValue;
use std::sync::atomic::{AtomicBool, Ordering};

/// Receives value and lifecycle notifications for one reference.
///
/// Called with the instance lock held: implementations must not block and
/// must not call back into the same instance.
pub trait ReferenceHandler: Send + Sync {
    fn handle_value_added(&self, instance: &DirectiveInstance, value: &AttachedValue);
    fn handle_value_removed(&self, instance: &DirectiveInstance, value: &AttachedValue);
    fn handle_instance_disposed(&self, instance: &DirectiveInstance);
}

type ValueFn = Box<dyn Fn(&DirectiveInstance, &AttachedValue) + Send + Sync>;
type DisposedFn = Box<dyn Fn(&DirectiveInstance) + Send + Sync>;

/// Adapter building a [`ReferenceHandler`] from optional closures
#[derive(Default)]
pub struct FnReferenceHandler {
    on_added: Option<ValueFn>,
    on_removed: Option<ValueFn>,
    on_disposed: Option<DisposedFn>,
}

impl FnReferenceHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_value_added(
        mut self,
        f: impl Fn(&DirectiveInstance, &AttachedValue) + Send + Sync + 'static,
    ) -> Self {
        self.on_added = Some(Box::new(f));
        self
    }

    pub fn on_value_removed(
        mut self,
        f: impl Fn(&DirectiveInstance, &AttachedValue) + Send + Sync + 'static,
    ) -> Self {
        self.on_removed = Some(Box::new(f));
        self
    }

    pub fn on_disposed(mut self, f: impl Fn(&DirectiveInstance) + Send + Sync + 'static) -> Self {
        self.on_disposed = Some(Box::new(f));
        self
    }
}

impl ReferenceHandler for FnReferenceHandler {
    fn handle_value_added(&self, instance: &DirectiveInstance, value: &AttachedValue) {
        if let Some(f) = &self.on_added {
            f(instance, value);
        }
    }

    fn handle_value_removed(&self, instance: &DirectiveInstance, value: &AttachedValue) {
        if let Some(f) = &self.on_removed {
            f(instance, value);
        }
    }

    fn handle_instance_disposed(&self, instance: &DirectiveInstance) {
        if let Some(f) = &self.on_disposed {
            f(instance);
        }
    }
}

/// A caller's claim on an instance.
///
/// Releasing the last strong reference disposes the instance, immediately or
/// after its grace period. Release is idempotent.
#[must_use = "an unreleased reference keeps the directive alive"]
pub struct Reference {
    id: u64,
    weak: bool,
    instance: DirectiveInstance,
    released: AtomicBool,
}

impl Reference {
    pub(crate) fn new(id: u64, weak: bool, instance: DirectiveInstance) -> Self {
        Self {
            id,
            weak,
            instance,
            released: AtomicBool::new(false),
        }
    }

    pub fn instance(&self) -> &DirectiveInstance {
        &self.instance
    }

    pub fn is_weak(&self) -> bool {
        self.weak
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.instance.remove_reference(self.id);
    }
}

impl std::fmt::Debug for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reference")
            .field("id", &self.id)
            .field("instance", &self.instance.id())
            .field("weak", &self.weak)
            .field("released", &self.is_released())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CallbackKind {
    Idle,
    Dispose,
}

/// Handle removing a registered idle or dispose callback. Idempotent.
pub struct CallbackRelease {
    id: u64,
    kind: CallbackKind,
    instance: DirectiveInstance,
    released: AtomicBool,
}

impl CallbackRelease {
    pub(crate) fn new(id: u64, kind: CallbackKind, instance: DirectiveInstance) -> Self {
        Self {
            id,
            kind,
            instance,
            released: AtomicBool::new(false),
        }
    }

    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.instance.remove_callback(self.kind, self.id);
    }
}
