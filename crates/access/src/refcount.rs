// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reference-counted directive access
//!
//! Many logical holders share one engine reference per key. The directive is
//! submitted on the first acquire and its reference released when the last
//! holder lets go.

use rebus_core::{BusError, Directive};
use rebus_engine::{
    DirectiveController, DirectiveInstance, FnReferenceHandler, Reference, ReferenceHandler,
};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type MakeDirective<K> = Box<dyn Fn(&K) -> Arc<dyn Directive> + Send + Sync>;
type MakeHandler<K> = Box<dyn Fn(&K) -> Arc<dyn ReferenceHandler> + Send + Sync>;

struct Entry {
    count: usize,
    /// Distinguishes a re-created entry from the one a holder acquired
    generation: u64,
    instance: DirectiveInstance,
    reference: Reference,
}

struct KeyedInner<K> {
    controller: DirectiveController,
    make_directive: MakeDirective<K>,
    make_handler: MakeHandler<K>,
    entries: Mutex<HashMap<K, Entry>>,
    next_generation: AtomicU64,
}

impl<K> KeyedInner<K> {
    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Shares one directive reference per key among many holders
pub struct KeyedRefCount<K> {
    inner: Arc<KeyedInner<K>>,
}

impl<K> Clone for KeyedRefCount<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> KeyedRefCount<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// `make_directive` builds the directive submitted for a key
    pub fn new(
        controller: DirectiveController,
        make_directive: impl Fn(&K) -> Arc<dyn Directive> + Send + Sync + 'static,
    ) -> Self {
        Self::with_handler(controller, make_directive, |_| -> Arc<dyn ReferenceHandler> {
            Arc::new(FnReferenceHandler::new())
        })
    }

    /// Like [`KeyedRefCount::new`], observing each key's values through the
    /// handler `make_handler` builds
    pub fn with_handler(
        controller: DirectiveController,
        make_directive: impl Fn(&K) -> Arc<dyn Directive> + Send + Sync + 'static,
        make_handler: impl Fn(&K) -> Arc<dyn ReferenceHandler> + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(KeyedInner {
                controller,
                make_directive: Box::new(make_directive),
                make_handler: Box::new(make_handler),
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Take a hold on `key`, submitting its directive if nobody holds it yet
    pub fn acquire(&self, key: K) -> Result<KeyedRef<K>, BusError> {
        if let Some(held) = self.try_join(&key) {
            return Ok(held);
        }

        // Submit outside the lock: dispatch runs handler code synchronously.
        let directive = (self.inner.make_directive)(&key);
        let handler = (self.inner.make_handler)(&key);
        let (instance, reference) = self.inner.controller.add_directive(directive, handler)?;

        let mut entries = self.inner.lock();
        if let Some(entry) = entries.get_mut(&key) {
            if !entry.instance.is_released() {
                // Another holder submitted first; share its reference instead.
                entry.count += 1;
                let held = self.held(key, entry);
                drop(entries);
                reference.release();
                return Ok(held);
            }
        }
        let entry = Entry {
            count: 1,
            generation: self.inner.next_generation.fetch_add(1, Ordering::Relaxed) + 1,
            instance,
            reference,
        };
        let held = self.held(key.clone(), &entry);
        let stale = entries.insert(key, entry);
        drop(entries);
        if let Some(stale) = stale {
            stale.reference.release();
        }
        Ok(held)
    }

    fn try_join(&self, key: &K) -> Option<KeyedRef<K>> {
        let mut entries = self.inner.lock();
        let entry = entries.get_mut(key)?;
        if entry.instance.is_released() {
            return None;
        }
        entry.count += 1;
        Some(self.held(key.clone(), entry))
    }

    fn held(&self, key: K, entry: &Entry) -> KeyedRef<K> {
        KeyedRef {
            key,
            generation: entry.generation,
            instance: entry.instance.clone(),
            owner: Arc::clone(&self.inner),
            released: AtomicBool::new(false),
        }
    }

    /// Number of holders of `key`
    pub fn count(&self, key: &K) -> usize {
        self.inner.lock().get(key).map_or(0, |e| e.count)
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().keys().cloned().collect()
    }
}

/// One holder's claim on a key. Releasing is idempotent.
#[must_use = "an unreleased hold keeps the directive alive"]
pub struct KeyedRef<K: Eq + Hash> {
    key: K,
    generation: u64,
    instance: DirectiveInstance,
    owner: Arc<KeyedInner<K>>,
    released: AtomicBool,
}

impl<K: Eq + Hash> KeyedRef<K> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn instance(&self) -> &DirectiveInstance {
        &self.instance
    }

    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let last = {
            let mut entries = self.owner.lock();
            match entries.get_mut(&self.key) {
                Some(entry) if entry.generation == self.generation => {
                    entry.count -= 1;
                    if entry.count == 0 {
                        entries.remove(&self.key)
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };
        if let Some(entry) = last {
            entry.reference.release();
        }
    }
}

impl<K: Eq + Hash + std::fmt::Debug> std::fmt::Debug for KeyedRef<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedRef")
            .field("key", &self.key)
            .field("instance", &self.instance.id())
            .field("released", &self.released.load(Ordering::Acquire))
            .finish()
    }
}

/// Shares one reference to a fixed directive among many holders
#[derive(Clone)]
pub struct DirectiveRefCount {
    keyed: KeyedRefCount<()>,
}

impl DirectiveRefCount {
    pub fn new(controller: DirectiveController, directive: Arc<dyn Directive>) -> Self {
        Self {
            keyed: KeyedRefCount::new(controller, move |_| Arc::clone(&directive)),
        }
    }

    /// Observe values through `handler` for as long as anyone holds the
    /// directive
    pub fn with_handler(
        controller: DirectiveController,
        directive: Arc<dyn Directive>,
        handler: Arc<dyn ReferenceHandler>,
    ) -> Self {
        Self {
            keyed: KeyedRefCount::with_handler(
                controller,
                move |_| Arc::clone(&directive),
                move |_| Arc::clone(&handler),
            ),
        }
    }

    pub fn acquire(&self) -> Result<KeyedRef<()>, BusError> {
        self.keyed.acquire(())
    }

    pub fn count(&self) -> usize {
        self.keyed.count(&())
    }
}

#[cfg(test)]
#[path = "refcount_tests.rs"]
mod tests;
