// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directive controller
//!
//! Owns the set of live instances and registered handlers. The controller
//! lock is never held while an instance lock is taken, with one exception:
//! a freshly created instance that nothing else can see yet.

use crate::handler::{DirectiveHandler, HandlerId};
use crate::instance::{DirectiveInstance, InstanceId, InstanceInfo};
use crate::reference::{Reference, ReferenceHandler};
use rebus_core::{BusError, Directive, EngineConfig, ResolveError};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// A registered handler. The token is canceled when it is removed.
pub(crate) struct HandlerEntry {
    pub(crate) id: HandlerId,
    pub(crate) handler: Arc<dyn DirectiveHandler>,
    pub(crate) token: CancellationToken,
}

#[derive(Default)]
struct ControllerState {
    closed: bool,
    instances: Vec<DirectiveInstance>,
    handlers: Vec<Arc<HandlerEntry>>,
    next_instance: u64,
    next_handler: u64,
}

pub(crate) struct ControllerShared {
    config: EngineConfig,
    state: Mutex<ControllerState>,
}

impl ControllerShared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop a disposed instance from the live set
    pub(crate) fn forget(&self, id: InstanceId) {
        self.lock().instances.retain(|i| i.id() != id);
    }
}

/// Registry of live directive instances and the handlers offered them.
/// Cheap to clone.
#[derive(Clone)]
pub struct DirectiveController {
    shared: Arc<ControllerShared>,
}

impl Default for DirectiveController {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl DirectiveController {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(ControllerShared {
                config,
                state: Mutex::new(ControllerState::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.shared.lock()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Submit a directive and attach a reference to its instance.
    ///
    /// An equivalent live instance is reused (and its values replayed to the
    /// new reference) unless the new directive supersedes it, in which case
    /// the old instance is disposed and replaced.
    pub fn add_directive(
        &self,
        directive: Arc<dyn Directive>,
        handler: Arc<dyn ReferenceHandler>,
    ) -> Result<(DirectiveInstance, Reference), BusError> {
        let (instance, reference) = self.submit(directive, Some(handler))?;
        match reference {
            Some(reference) => Ok((instance, reference)),
            None => Err(BusError::DirectiveDisposed),
        }
    }

    /// Submit a directive without holding a reference.
    ///
    /// A new instance is disposed under the usual unreferenced rules once its
    /// creation dispatch completes.
    pub fn add_directive_unreferenced(
        &self,
        directive: Arc<dyn Directive>,
    ) -> Result<DirectiveInstance, BusError> {
        self.submit(directive, None).map(|(instance, _)| instance)
    }

    fn submit(
        &self,
        directive: Arc<dyn Directive>,
        handler: Option<Arc<dyn ReferenceHandler>>,
    ) -> Result<(DirectiveInstance, Option<Reference>), BusError> {
        directive.validate()?;

        loop {
            let mut st = self.lock();
            if st.closed {
                return Err(BusError::Closed);
            }
            st.instances.retain(|i| !i.is_released());
            let existing = st
                .instances
                .iter()
                .find(|i| i.directive().is_equivalent(directive.as_ref()))
                .cloned();

            if let Some(existing) = &existing {
                if !directive.supersedes(existing.directive().as_ref()) {
                    drop(st);
                    let Some(handler) = &handler else {
                        return Ok((existing.clone(), None));
                    };
                    match existing.add_reference(Arc::clone(handler), false) {
                        Some(reference) => {
                            tracing::trace!(
                                directive = directive.name(),
                                instance = %existing.id(),
                                "merged into equivalent instance"
                            );
                            return Ok((existing.clone(), Some(reference)));
                        }
                        // Disposed between lookup and attach
                        None => continue,
                    }
                }
                st.instances.retain(|i| i.id() != existing.id());
            }

            st.next_instance += 1;
            let id = InstanceId(st.next_instance);
            let instance = DirectiveInstance::new(
                id,
                Arc::clone(&directive),
                &self.shared.config,
                Arc::downgrade(&self.shared),
            );
            let reference = handler.and_then(|h| instance.add_reference(h, false));
            let handlers = st.handlers.clone();
            st.instances.push(instance.clone());
            drop(st);

            if let Some(old) = existing {
                tracing::debug!(
                    directive = directive.name(),
                    old = %old.id(),
                    new = %id,
                    "directive superseded"
                );
                old.close();
            }
            tracing::debug!(directive = directive.name(), instance = %id, "directive added");
            self.dispatch(&instance, &handlers);
            if reference.is_none() {
                instance.release_if_unreferenced();
            }
            return Ok((instance, reference));
        }
    }

    fn dispatch(&self, instance: &DirectiveInstance, handlers: &[Arc<HandlerEntry>]) {
        let span = tracing::debug_span!(
            "dispatch",
            directive = instance.directive().name(),
            instance = %instance.id(),
        );
        let _guard = span.enter();
        for entry in handlers {
            if entry.token.is_cancelled() {
                continue;
            }
            instance.offer(entry);
        }
        instance.end_dispatch();
    }

    /// Register a handler and offer it every live instance
    pub fn add_handler(&self, handler: Arc<dyn DirectiveHandler>) -> Result<HandlerId, BusError> {
        let (entry, instances) = {
            let mut st = self.lock();
            if st.closed {
                return Err(BusError::Closed);
            }
            st.next_handler += 1;
            let entry = Arc::new(HandlerEntry {
                id: HandlerId(st.next_handler),
                handler,
                token: CancellationToken::new(),
            });
            st.handlers.push(Arc::clone(&entry));
            (entry, st.instances.clone())
        };
        tracing::debug!(handler = %entry.id, instances = instances.len(), "handler added");
        for instance in &instances {
            if entry.token.is_cancelled() {
                break;
            }
            instance.offer(&entry);
        }
        Ok(entry.id)
    }

    /// Unregister a handler, stopping every resolver it started and removing
    /// their values
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.detach(id, None)
    }

    /// Like [`remove_handler`](Self::remove_handler), recording `err` against
    /// every instance the handler had attached resolvers to
    pub fn remove_handler_with_error(&self, id: HandlerId, err: ResolveError) -> bool {
        self.detach(id, Some(err))
    }

    fn detach(&self, id: HandlerId, cause: Option<ResolveError>) -> bool {
        let (entry, instances) = {
            let mut st = self.lock();
            let Some(pos) = st.handlers.iter().position(|h| h.id == id) else {
                return false;
            };
            (st.handlers.remove(pos), st.instances.clone())
        };
        entry.token.cancel();
        for instance in &instances {
            instance.detach_handler(id, cause.clone());
        }
        tracing::debug!(handler = %id, "handler removed");
        true
    }

    /// Live instances, in creation order
    pub fn get_directives(&self) -> Vec<DirectiveInstance> {
        self.lock()
            .instances
            .iter()
            .filter(|i| !i.is_released())
            .cloned()
            .collect()
    }

    pub fn directive_infos(&self) -> Vec<InstanceInfo> {
        self.get_directives().iter().map(|i| i.info()).collect()
    }

    pub fn handler_count(&self) -> usize {
        self.lock().handlers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Dispose every instance and drop every handler. Further submissions
    /// fail with [`BusError::Closed`].
    pub fn close(&self) {
        let (instances, handlers) = {
            let mut st = self.lock();
            if st.closed {
                return;
            }
            st.closed = true;
            (
                std::mem::take(&mut st.instances),
                std::mem::take(&mut st.handlers),
            )
        };
        for entry in &handlers {
            entry.token.cancel();
        }
        for instance in &instances {
            instance.close();
        }
        tracing::info!(
            instances = instances.len(),
            handlers = handlers.len(),
            "controller closed"
        );
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
