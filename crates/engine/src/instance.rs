// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directive instances
//!
//! An instance is the live, de-duplicated state of one directive: attached
//! values, references, handler attachments and the resolvers they started.
//! Every mutation happens under the instance lock, and reference handlers are
//! notified while it is held so each reference sees values in accept order.

use crate::controller::{ControllerShared, HandlerEntry};
use crate::handler::HandlerId;
use crate::reference::{CallbackKind, CallbackRelease, Reference, ReferenceHandler};
use crate::resolver::Resolver;
use crate::supervisor::{self, Outcome, SlotCtx};
use rebus_core::{
    AttachedValue, Directive, DirectiveInfo, EngineConfig, ResolveError, Value, ValueId,
    ValueIdAllocator, ValueOptions,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

type IdleCallback = Arc<dyn Fn(&[ResolveError]) + Send + Sync>;
type DisposeCallback = Box<dyn FnOnce() + Send>;
pub(crate) type ValueRemovedCallback = Box<dyn FnOnce(&AttachedValue) + Send>;
pub(crate) type ResolverRemovedCallback = Box<dyn FnOnce() + Send>;

/// Opaque handle identifying an instance within its controller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct SlotId(pub(crate) u64);

/// Status snapshot of an instance, as reported to status readers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub id: InstanceId,
    pub directive: DirectiveInfo,
    pub value_count: usize,
    pub reference_count: usize,
    pub running_resolvers: usize,
    pub idle: bool,
    /// Errors reported at the last idle transition
    pub errors: Vec<String>,
}

struct ValueEntry {
    value: AttachedValue,
    slot: SlotId,
    removed_callbacks: Vec<ValueRemovedCallback>,
}

struct RefEntry {
    id: u64,
    handler: Arc<dyn ReferenceHandler>,
    weak: bool,
}

/// One resolver started through a handler attachment
struct SlotState {
    id: SlotId,
    ctx: watch::Sender<SlotCtx>,
    /// Parent of every attempt token handed to this resolver
    parent: CancellationToken,
    token: Option<CancellationToken>,
    generation: u64,
    /// Attempt that the value cap interrupted; it may still publish under a
    /// soft cap
    capped_generation: Option<u64>,
    running: bool,
    marked_idle: bool,
    /// Returned `Ok(())`; never restarted by cap changes
    finished: bool,
    removed_callbacks: Vec<ResolverRemovedCallback>,
}

impl SlotState {
    fn is_active(&self) -> bool {
        self.running && !self.marked_idle
    }

    fn launch(&mut self) {
        self.generation += 1;
        self.capped_generation = None;
        let token = self.parent.child_token();
        self.token = Some(token.clone());
        self.running = true;
        self.marked_idle = false;
        let _ = self.ctx.send(SlotCtx::Run {
            token,
            generation: self.generation,
        });
    }

    fn pause(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
            self.capped_generation = Some(self.generation);
        }
        self.generation += 1;
        self.running = false;
        self.marked_idle = false;
        let _ = self.ctx.send(SlotCtx::Paused);
    }

    fn stop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        self.capped_generation = None;
        self.running = false;
        let _ = self.ctx.send(SlotCtx::Stopped);
    }
}

struct Attachment {
    handler: HandlerId,
    token: CancellationToken,
    slots: Vec<SlotState>,
}

struct InstanceState {
    released: bool,
    values: Vec<ValueEntry>,
    value_ids: ValueIdAllocator,
    references: Vec<RefEntry>,
    ever_referenced: bool,
    offered: HashSet<HandlerId>,
    attachments: Vec<Attachment>,
    /// Offers in flight; the instance is not idle while any are pending
    dispatching: usize,
    idle: bool,
    /// Resolvers paused because the value cap was reached
    capped: bool,
    pending_errors: Vec<ResolveError>,
    last_idle_errors: Vec<ResolveError>,
    idle_callbacks: Vec<(u64, IdleCallback)>,
    dispose_callbacks: Vec<(u64, DisposeCallback)>,
    /// Bumped whenever a pending unref-dispose timer becomes stale
    dispose_generation: u64,
    next_id: u64,
}

impl InstanceState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn slots(&self) -> impl Iterator<Item = &SlotState> {
        self.attachments.iter().flat_map(|a| a.slots.iter())
    }

    fn slots_mut(&mut self) -> impl Iterator<Item = &mut SlotState> {
        self.attachments.iter_mut().flat_map(|a| a.slots.iter_mut())
    }

    fn slot_mut(&mut self, slot: SlotId) -> Option<&mut SlotState> {
        self.slots_mut().find(|s| s.id == slot)
    }

    fn running_resolvers(&self) -> usize {
        self.slots().filter(|s| s.is_active()).count()
    }

    fn busy(&self) -> bool {
        self.dispatching > 0 || self.slots().any(|s| s.is_active())
    }

    fn strong_references(&self) -> usize {
        self.references.iter().filter(|r| !r.weak).count()
    }
}

struct InstanceInner {
    id: InstanceId,
    directive: Arc<dyn Directive>,
    options: ValueOptions,
    unref_dispose: Duration,
    trace_values: bool,
    token: CancellationToken,
    released: AtomicBool,
    /// Mirrors `InstanceState::idle` for readers that hold no lock
    idle: AtomicBool,
    controller: Weak<ControllerShared>,
    state: Mutex<InstanceState>,
}

/// Live, de-duplicated state of one directive. Cheap to clone.
#[derive(Clone)]
pub struct DirectiveInstance {
    inner: Arc<InstanceInner>,
}

impl DirectiveInstance {
    /// Create an instance with its creation dispatch pending
    pub(crate) fn new(
        id: InstanceId,
        directive: Arc<dyn Directive>,
        config: &EngineConfig,
        controller: Weak<ControllerShared>,
    ) -> Self {
        let options = directive.value_options();
        Self {
            inner: Arc::new(InstanceInner {
                id,
                unref_dispose: config.unref_dispose_for(options.unref_dispose_dur),
                options,
                directive,
                trace_values: config.trace_values,
                token: CancellationToken::new(),
                released: AtomicBool::new(false),
                idle: AtomicBool::new(false),
                controller,
                state: Mutex::new(InstanceState {
                    released: false,
                    values: Vec::new(),
                    value_ids: ValueIdAllocator::new(),
                    references: Vec::new(),
                    ever_referenced: false,
                    offered: HashSet::new(),
                    attachments: Vec::new(),
                    dispatching: 1,
                    idle: false,
                    capped: false,
                    pending_errors: Vec::new(),
                    last_idle_errors: Vec::new(),
                    idle_callbacks: Vec::new(),
                    dispose_callbacks: Vec::new(),
                    dispose_generation: 0,
                    next_id: 0,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, InstanceState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> InstanceId {
        self.inner.id
    }

    pub fn directive(&self) -> &Arc<dyn Directive> {
        &self.inner.directive
    }

    pub fn value_options(&self) -> ValueOptions {
        self.inner.options
    }

    /// Canceled when the instance is disposed
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Does not take the instance lock, so reference handlers may call it.
    pub fn is_idle(&self) -> bool {
        self.inner.idle.load(Ordering::Acquire)
    }

    /// Currently attached values in accept order
    pub fn values(&self) -> Vec<AttachedValue> {
        self.lock().values.iter().map(|v| v.value.clone()).collect()
    }

    pub fn reference_count(&self) -> usize {
        self.lock().references.len()
    }

    pub fn info(&self) -> InstanceInfo {
        let st = self.lock();
        InstanceInfo {
            id: self.id(),
            directive: self.inner.directive.info(),
            value_count: st.values.len(),
            reference_count: st.references.len(),
            running_resolvers: st.running_resolvers(),
            idle: st.idle,
            errors: st.last_idle_errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Attach a reference and replay every attached value to it.
    ///
    /// Weak references are notified like any other but do not keep the
    /// instance alive. Returns `None` if the instance was already disposed.
    pub fn add_reference(
        &self,
        handler: Arc<dyn ReferenceHandler>,
        weak: bool,
    ) -> Option<Reference> {
        let mut st = self.lock();
        if st.released {
            return None;
        }
        let id = st.next_id();
        if !weak {
            st.ever_referenced = true;
            st.dispose_generation += 1;
        }
        for entry in &st.values {
            handler.handle_value_added(self, &entry.value);
        }
        st.references.push(RefEntry { id, handler, weak });
        Some(Reference::new(id, weak, self.clone()))
    }

    pub(crate) fn remove_reference(&self, id: u64) {
        let closed = {
            let mut st = self.lock();
            if st.released {
                return;
            }
            let Some(pos) = st.references.iter().position(|r| r.id == id) else {
                return;
            };
            let entry = st.references.remove(pos);
            if entry.weak {
                return;
            }
            self.check_unreferenced(&mut st)
        };
        if closed {
            self.forget();
        }
    }

    /// Register a callback for idle transitions.
    ///
    /// Invoked immediately (with the errors of the last transition) if the
    /// instance is already idle. Runs with the instance lock held.
    pub fn add_idle_callback(
        &self,
        cb: impl Fn(&[ResolveError]) + Send + Sync + 'static,
    ) -> CallbackRelease {
        let mut st = self.lock();
        let id = st.next_id();
        if !st.released {
            let cb: IdleCallback = Arc::new(cb);
            if st.idle {
                cb(&st.last_idle_errors);
            }
            st.idle_callbacks.push((id, cb));
        }
        CallbackRelease::new(id, CallbackKind::Idle, self.clone())
    }

    /// Register a callback run once when the instance is disposed.
    ///
    /// Runs immediately if the instance is already disposed.
    pub fn add_dispose_callback(&self, cb: impl FnOnce() + Send + 'static) -> CallbackRelease {
        let mut st = self.lock();
        let id = st.next_id();
        if st.released {
            drop(st);
            cb();
        } else {
            st.dispose_callbacks.push((id, Box::new(cb)));
        }
        CallbackRelease::new(id, CallbackKind::Dispose, self.clone())
    }

    pub(crate) fn remove_callback(&self, kind: CallbackKind, id: u64) {
        let mut st = self.lock();
        match kind {
            CallbackKind::Idle => st.idle_callbacks.retain(|(cb_id, _)| *cb_id != id),
            CallbackKind::Dispose => st.dispose_callbacks.retain(|(cb_id, _)| *cb_id != id),
        }
    }

    /// Dispose the instance: stop resolvers, clear values, notify references
    pub fn close(&self) {
        let closed = {
            let mut st = self.lock();
            self.close_locked(&mut st)
        };
        if closed {
            self.forget();
        }
    }

    /// Dispose the instance if no strong references remain
    pub fn close_if_unreferenced(&self) -> bool {
        let closed = {
            let mut st = self.lock();
            if st.strong_references() > 0 {
                return false;
            }
            self.close_locked(&mut st)
        };
        if closed {
            self.forget();
        }
        closed
    }

    /// Cancel every resolver attempt and invoke it again with a fresh context.
    ///
    /// Resolvers that already finished are run again too.
    pub fn restart_resolvers(&self) {
        let mut st = self.lock();
        if st.released {
            return;
        }
        let capped = st.capped;
        for slot in st.slots_mut() {
            slot.finished = false;
            if capped {
                slot.pause();
            } else {
                if let Some(token) = slot.token.take() {
                    token.cancel();
                }
                slot.launch();
            }
        }
        tracing::debug!(
            directive = self.inner.directive.name(),
            instance = %self.id(),
            "resolvers restarted"
        );
        self.settle(&mut st);
    }

    /// Offer this instance to a handler, starting any resolvers it returns
    pub(crate) fn offer(&self, entry: &HandlerEntry) {
        {
            let mut st = self.lock();
            if st.released || !st.offered.insert(entry.id) {
                return;
            }
            st.dispatching += 1;
        }

        // Handler code runs without the instance lock held.
        let result = entry.handler.handle_directive(self);

        let mut st = self.lock();
        st.dispatching -= 1;
        match result {
            Ok(resolvers) if resolvers.is_empty() => {}
            Ok(resolvers) => {
                if st.released || entry.token.is_cancelled() {
                    tracing::trace!(handler = %entry.id, "dropping resolvers for detached handler");
                } else {
                    self.attach(&mut st, entry.id, resolvers);
                }
            }
            Err(e) => {
                tracing::warn!(
                    directive = self.inner.directive.name(),
                    instance = %self.id(),
                    handler = %entry.id,
                    error = %e,
                    "handler failed"
                );
                st.pending_errors.push(ResolveError::failed(e));
            }
        }
        self.settle(&mut st);
    }

    /// Mark the creation dispatch complete
    pub(crate) fn end_dispatch(&self) {
        let mut st = self.lock();
        st.dispatching = st.dispatching.saturating_sub(1);
        self.settle(&mut st);
    }

    /// Dispose the instance if nothing holds a strong reference
    pub(crate) fn release_if_unreferenced(&self) {
        let closed = {
            let mut st = self.lock();
            if st.released || st.strong_references() > 0 {
                return;
            }
            self.check_unreferenced(&mut st)
        };
        if closed {
            self.forget();
        }
    }

    fn attach(&self, st: &mut InstanceState, handler: HandlerId, resolvers: Vec<Arc<dyn Resolver>>) {
        let token = self.inner.token.child_token();
        let mut slots = Vec::with_capacity(resolvers.len());
        for resolver in resolvers {
            let id = SlotId(st.next_id());
            let (ctx, rx) = watch::channel(SlotCtx::Paused);
            let mut slot = SlotState {
                id,
                ctx,
                parent: token.clone(),
                token: None,
                generation: 0,
                capped_generation: None,
                running: false,
                marked_idle: false,
                finished: false,
                removed_callbacks: Vec::new(),
            };
            if !st.capped {
                slot.launch();
            }
            if !supervisor::spawn(self.clone(), id, resolver, rx) {
                slot.stop();
                st.pending_errors
                    .push(ResolveError::failed("no async runtime to run resolver"));
            }
            slots.push(slot);
        }
        tracing::debug!(
            directive = self.inner.directive.name(),
            instance = %self.id(),
            handler = %handler,
            resolvers = slots.len(),
            "resolvers attached"
        );
        st.attachments.push(Attachment {
            handler,
            token,
            slots,
        });
    }

    /// Stop the resolvers a handler attached, recording `cause` if given
    pub(crate) fn detach_handler(&self, handler: HandlerId, cause: Option<ResolveError>) {
        let mut st = self.lock();
        st.offered.remove(&handler);
        if st.released {
            return;
        }
        let Some(pos) = st.attachments.iter().position(|a| a.handler == handler) else {
            return;
        };
        let attachment = st.attachments.remove(pos);
        attachment.token.cancel();
        for slot in attachment.slots {
            self.stop_slot(&mut st, slot);
        }
        if let Some(err) = cause {
            st.pending_errors.push(err);
        }
        tracing::debug!(
            directive = self.inner.directive.name(),
            instance = %self.id(),
            handler = %handler,
            "handler detached"
        );
        self.maybe_resume(&mut st);
        self.settle(&mut st);
    }

    fn stop_slot(&self, st: &mut InstanceState, mut slot: SlotState) {
        slot.stop();
        for cb in slot.removed_callbacks.drain(..) {
            cb();
        }
        let mut idx = 0;
        while idx < st.values.len() {
            if st.values[idx].slot == slot.id {
                let entry = st.values.remove(idx);
                self.notify_removed(st, entry);
            } else {
                idx += 1;
            }
        }
    }

    pub(crate) fn end_attempt(&self, slot: SlotId, generation: u64, outcome: Outcome) {
        let mut st = self.lock();
        if st.released {
            return;
        }
        let Some(s) = st.slot_mut(slot) else {
            return;
        };
        if s.generation != generation {
            return;
        }
        s.running = false;
        s.marked_idle = false;
        s.finished = matches!(outcome, Outcome::Done);
        match outcome {
            Outcome::Done | Outcome::Canceled => {}
            Outcome::Failed(err) => {
                tracing::warn!(
                    directive = self.inner.directive.name(),
                    instance = %self.id(),
                    error = %err,
                    "resolver failed"
                );
                st.pending_errors.push(err);
            }
        }
        self.settle(&mut st);
    }

    pub(crate) fn mark_idle(&self, slot: SlotId, generation: u64, idle: bool) {
        let mut st = self.lock();
        if st.released {
            return;
        }
        let Some(s) = st.slot_mut(slot) else {
            return;
        };
        if s.generation != generation || !s.running {
            return;
        }
        s.marked_idle = idle;
        self.settle(&mut st);
    }

    pub(crate) fn add_value(&self, slot: SlotId, generation: u64, value: Value) -> Option<ValueId> {
        let mut st = self.lock();
        if st.released {
            return None;
        }
        let options = self.inner.options;
        let accepted = match st.slot_mut(slot) {
            Some(s) if s.generation == generation && s.token.is_some() => true,
            // A soft cap keeps values from an attempt the cap interrupted.
            Some(s) => !options.max_value_hard_cap && s.capped_generation == Some(generation),
            None => false,
        };
        if !accepted {
            return None;
        }
        if options.max_value_hard_cap && options.is_capped(st.values.len()) {
            tracing::trace!(
                directive = self.inner.directive.name(),
                instance = %self.id(),
                "value rejected at hard cap"
            );
            return None;
        }

        let state = &mut *st;
        let id = state
            .value_ids
            .allocate(|id| state.values.iter().any(|v| v.value.id() == id));
        let attached = AttachedValue::new(id, value);
        state.values.push(ValueEntry {
            value: attached.clone(),
            slot,
            removed_callbacks: Vec::new(),
        });
        if self.inner.trace_values {
            tracing::trace!(
                directive = self.inner.directive.name(),
                instance = %self.id(),
                value_id = %id,
                "value added"
            );
        }
        for r in &state.references {
            r.handler.handle_value_added(self, &attached);
        }

        if !state.capped && options.is_capped(state.values.len()) {
            state.capped = true;
            for s in state.slots_mut() {
                s.pause();
            }
            tracing::debug!(
                directive = self.inner.directive.name(),
                instance = %self.id(),
                "value cap reached, resolvers paused"
            );
            self.settle(state);
        }
        Some(id)
    }

    pub(crate) fn remove_value(&self, slot: SlotId, id: ValueId) -> Option<AttachedValue> {
        let mut st = self.lock();
        let pos = st
            .values
            .iter()
            .position(|v| v.value.id() == id && v.slot == slot)?;
        let entry = st.values.remove(pos);
        let value = entry.value.clone();
        self.notify_removed(&mut st, entry);
        self.maybe_resume(&mut st);
        self.settle(&mut st);
        Some(value)
    }

    pub(crate) fn clear_values(&self, slot: SlotId) -> Vec<ValueId> {
        let mut st = self.lock();
        let mut removed = Vec::new();
        let mut idx = 0;
        while idx < st.values.len() {
            if st.values[idx].slot == slot {
                let entry = st.values.remove(idx);
                removed.push(entry.value.id());
                self.notify_removed(&mut st, entry);
            } else {
                idx += 1;
            }
        }
        if !removed.is_empty() {
            self.maybe_resume(&mut st);
            self.settle(&mut st);
        }
        removed
    }

    pub(crate) fn add_value_removed_callback(
        &self,
        slot: SlotId,
        id: ValueId,
        cb: ValueRemovedCallback,
    ) -> bool {
        let mut st = self.lock();
        match st
            .values
            .iter_mut()
            .find(|v| v.value.id() == id && v.slot == slot)
        {
            Some(entry) => {
                entry.removed_callbacks.push(cb);
                true
            }
            None => false,
        }
    }

    pub(crate) fn add_resolver_removed_callback(
        &self,
        slot: SlotId,
        cb: ResolverRemovedCallback,
    ) -> bool {
        let mut st = self.lock();
        match st.slot_mut(slot) {
            Some(s) => {
                s.removed_callbacks.push(cb);
                true
            }
            None => false,
        }
    }

    fn notify_removed(&self, st: &mut InstanceState, entry: ValueEntry) {
        if self.inner.trace_values {
            tracing::trace!(
                directive = self.inner.directive.name(),
                instance = %self.id(),
                value_id = %entry.value.id(),
                "value removed"
            );
        }
        for r in &st.references {
            r.handler.handle_value_removed(self, &entry.value);
        }
        for cb in entry.removed_callbacks {
            cb(&entry.value);
        }
    }

    /// Restart paused resolvers once the instance drops below its cap
    fn maybe_resume(&self, st: &mut InstanceState) {
        if st.released || !st.capped || self.inner.options.is_capped(st.values.len()) {
            return;
        }
        st.capped = false;
        for slot in st.slots_mut() {
            if !slot.finished && !slot.running {
                slot.launch();
            }
        }
        tracing::debug!(
            directive = self.inner.directive.name(),
            instance = %self.id(),
            "below value cap, resolvers restarted"
        );
    }

    /// Fire idle callbacks if the instance just transitioned to idle
    fn settle(&self, st: &mut InstanceState) {
        if st.released {
            return;
        }
        if st.busy() {
            st.idle = false;
            self.inner.idle.store(false, Ordering::Release);
            return;
        }
        if st.idle {
            return;
        }
        st.idle = true;
        self.inner.idle.store(true, Ordering::Release);
        st.last_idle_errors = std::mem::take(&mut st.pending_errors);
        tracing::trace!(
            directive = self.inner.directive.name(),
            instance = %self.id(),
            errors = st.last_idle_errors.len(),
            "directive idle"
        );
        for (_, cb) in &st.idle_callbacks {
            cb(&st.last_idle_errors);
        }
    }

    /// Called when the last strong reference went away. Returns true if the
    /// instance was disposed immediately.
    fn check_unreferenced(&self, st: &mut InstanceState) -> bool {
        if st.strong_references() > 0 {
            return false;
        }
        let grace = self.inner.unref_dispose;
        let empty = !st.ever_referenced || st.values.is_empty();
        if grace.is_zero() || (self.inner.options.unref_dispose_empty_immediate && empty) {
            return self.close_locked(st);
        }

        st.dispose_generation += 1;
        let generation = st.dispose_generation;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return self.close_locked(st);
        };
        let this = self.clone();
        runtime.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(grace) => this.expire_unreferenced(generation),
                _ = this.inner.token.cancelled() => {}
            }
        });
        tracing::trace!(
            directive = self.inner.directive.name(),
            instance = %self.id(),
            ?grace,
            "unreferenced, dispose scheduled"
        );
        false
    }

    fn expire_unreferenced(&self, generation: u64) {
        let closed = {
            let mut st = self.lock();
            if st.dispose_generation != generation || st.strong_references() > 0 {
                return;
            }
            self.close_locked(&mut st)
        };
        if closed {
            self.forget();
        }
    }

    fn close_locked(&self, st: &mut InstanceState) -> bool {
        if st.released {
            return false;
        }
        st.released = true;
        self.inner.released.store(true, Ordering::Release);
        self.inner.token.cancel();

        for attachment in std::mem::take(&mut st.attachments) {
            attachment.token.cancel();
            for slot in attachment.slots {
                self.stop_slot(st, slot);
            }
        }
        for entry in std::mem::take(&mut st.values) {
            self.notify_removed(st, entry);
        }
        for r in std::mem::take(&mut st.references) {
            r.handler.handle_instance_disposed(self);
        }
        st.idle_callbacks.clear();
        for (_, cb) in std::mem::take(&mut st.dispose_callbacks) {
            cb();
        }
        tracing::debug!(
            directive = self.inner.directive.name(),
            instance = %self.id(),
            "directive disposed"
        );
        true
    }

    fn forget(&self) {
        if let Some(controller) = self.inner.controller.upgrade() {
            controller.forget(self.id());
        }
    }
}

impl fmt::Debug for DirectiveInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveInstance")
            .field("id", &self.inner.id)
            .field("directive", &self.inner.directive.name())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
