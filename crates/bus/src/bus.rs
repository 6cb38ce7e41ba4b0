// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller attachment and failure isolation

use crate::controller::{Controller, ControllerInfo};
use rebus_core::{BusConfig, BusError, Directive, RebusConfig, ResolveError};
use rebus_engine::panic::join_error_message;
use rebus_engine::{
    DirectiveController, DirectiveHandler, DirectiveInstance, HandlerId, Reference,
    ReferenceHandler,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Called once with the result of a controller's task
pub type ExitCallback = Box<dyn FnOnce(Result<(), BusError>) + Send>;

struct Attached {
    key: u64,
    controller: Arc<dyn Controller>,
    handler: HandlerId,
    token: CancellationToken,
}

#[derive(Default)]
struct BusState {
    attached: Vec<Attached>,
    next_key: u64,
}

struct BusInner {
    controller: DirectiveController,
    config: BusConfig,
    state: Mutex<BusState>,
}

/// Couples the directive engine to a set of running controllers.
/// Cheap to clone.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Bus {
    pub fn new(controller: DirectiveController, config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                controller,
                config,
                state: Mutex::new(BusState::default()),
            }),
        }
    }

    /// Build a bus and its engine from loaded configuration
    pub fn from_config(config: &RebusConfig) -> Self {
        Self::new(
            DirectiveController::new(config.engine.clone()),
            config.bus.clone(),
        )
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn directive_controller(&self) -> &DirectiveController {
        &self.inner.controller
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    pub fn add_directive(
        &self,
        directive: Arc<dyn Directive>,
        handler: Arc<dyn ReferenceHandler>,
    ) -> Result<(DirectiveInstance, Reference), BusError> {
        self.inner.controller.add_directive(directive, handler)
    }

    pub fn get_directives(&self) -> Vec<DirectiveInstance> {
        self.inner.controller.get_directives()
    }

    /// Attach a controller and start its task.
    ///
    /// The task runs under a child of `token`. When it exits the controller is
    /// detached unless it returned `Ok(())` and the bus keeps clean exits
    /// attached. A panic is recovered and reported as
    /// [`BusError::ControllerPanicked`]. `on_exit` receives the task result.
    pub fn add_controller(
        &self,
        token: &CancellationToken,
        controller: Arc<dyn Controller>,
        on_exit: Option<ExitCallback>,
    ) -> Result<ControllerRelease, BusError> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return Err(BusError::Handler(
                "no async runtime to run controller".to_string(),
            ));
        };
        let info = controller.info();
        let (key, token) = self.attach(token, Arc::clone(&controller))?;
        tracing::info!(controller = %info.id, version = %info.version, "controller added");

        let bus = self.clone();
        let task_token = token.clone();
        runtime.spawn(async move {
            let result = run(controller, task_token.clone(), info.id.clone()).await;
            bus.finish(key, &info.id, &task_token, &result).await;
            if let Some(on_exit) = on_exit {
                on_exit(result);
            }
        });

        Ok(ControllerRelease {
            key,
            bus: self.clone(),
            released: AtomicBool::new(false),
        })
    }

    /// Attach a controller, run its task to completion, then detach it
    pub async fn execute_controller(
        &self,
        token: &CancellationToken,
        controller: Arc<dyn Controller>,
    ) -> Result<(), BusError> {
        let info = controller.info();
        let (key, token) = self.attach(token, Arc::clone(&controller))?;
        tracing::info!(controller = %info.id, version = %info.version, "executing controller");

        let result = run(controller, token.clone(), info.id.clone()).await;
        if let Some(detached) = self.detach(key, failure_cause(&result)) {
            self.close_controller(detached).await;
        }
        tracing::info!(controller = %info.id, ok = result.is_ok(), "controller finished");
        result
    }

    fn attach(
        &self,
        parent: &CancellationToken,
        controller: Arc<dyn Controller>,
    ) -> Result<(u64, CancellationToken), BusError> {
        let handler: Arc<dyn DirectiveHandler> = controller.clone();
        let handler = self.inner.controller.add_handler(handler)?;
        let token = parent.child_token();
        let mut st = self.lock();
        st.next_key += 1;
        let key = st.next_key;
        st.attached.push(Attached {
            key,
            controller,
            handler,
            token: token.clone(),
        });
        Ok((key, token))
    }

    /// Apply the exit policy once a controller's task returned
    async fn finish(
        &self,
        key: u64,
        id: &str,
        token: &CancellationToken,
        result: &Result<(), BusError>,
    ) {
        let detach = match result {
            Ok(()) => self.inner.config.detach_on_clean_exit || token.is_cancelled(),
            Err(e) if e.is_canceled() => true,
            Err(e) => {
                tracing::warn!(controller = %id, error = %e, "controller exited with error");
                true
            }
        };
        if !detach {
            tracing::debug!(controller = %id, "controller task finished, handler stays attached");
            return;
        }
        if let Some(detached) = self.detach(key, failure_cause(result)) {
            self.close_controller(detached).await;
        }
    }

    /// Remove an attachment. Returns the controller if this call detached it.
    fn detach(&self, key: u64, cause: Option<ResolveError>) -> Option<Arc<dyn Controller>> {
        let attached = {
            let mut st = self.lock();
            let pos = st.attached.iter().position(|a| a.key == key)?;
            st.attached.remove(pos)
        };
        attached.token.cancel();
        match cause {
            Some(err) => self
                .inner
                .controller
                .remove_handler_with_error(attached.handler, err),
            None => self.inner.controller.remove_handler(attached.handler),
        };
        tracing::debug!(handler = %attached.handler, "controller detached");
        Some(attached.controller)
    }

    async fn close_controller(&self, controller: Arc<dyn Controller>) {
        if !self.inner.config.close_on_release {
            return;
        }
        if let Err(e) = controller.close().await {
            tracing::warn!(controller = %controller.info().id, error = %e, "controller close failed");
        }
    }

    /// Close a detached controller from synchronous code
    fn spawn_close(&self, controller: Arc<dyn Controller>) {
        if !self.inner.config.close_on_release {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(controller = %controller.info().id, "no async runtime to close controller");
            return;
        };
        let bus = self.clone();
        runtime.spawn(async move { bus.close_controller(controller).await });
    }

    /// Info for every attached controller, in attach order
    pub fn get_controllers(&self) -> Vec<ControllerInfo> {
        let controllers: Vec<_> = self
            .lock()
            .attached
            .iter()
            .map(|a| Arc::clone(&a.controller))
            .collect();
        controllers.iter().map(|c| c.info()).collect()
    }

    /// Detach every attachment of `controller`. Returns false if it was not
    /// attached.
    pub fn remove_controller(&self, controller: &Arc<dyn Controller>) -> bool {
        let target = Arc::as_ptr(controller) as *const ();
        let keys: Vec<u64> = self
            .lock()
            .attached
            .iter()
            .filter(|a| Arc::as_ptr(&a.controller) as *const () == target)
            .map(|a| a.key)
            .collect();
        let mut removed = false;
        for key in keys {
            if let Some(detached) = self.detach(key, None) {
                self.spawn_close(detached);
                removed = true;
            }
        }
        removed
    }

    /// Detach every controller, then shut down the engine
    pub async fn close(&self) {
        let keys: Vec<u64> = self.lock().attached.iter().map(|a| a.key).collect();
        for key in keys {
            if let Some(detached) = self.detach(key, None) {
                self.close_controller(detached).await;
            }
        }
        self.inner.controller.close();
    }
}

/// Run a controller task on its own tokio task so a panic is contained
async fn run(
    controller: Arc<dyn Controller>,
    token: CancellationToken,
    id: String,
) -> Result<(), BusError> {
    let span = tracing::info_span!("controller", id = %id);
    let task = tokio::spawn(async move { controller.execute(token).await }.instrument(span));
    match task.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            let message = join_error_message(e);
            tracing::error!(controller = %id, %message, "controller panicked");
            Err(BusError::ControllerPanicked { id, message })
        }
        Err(_) => Err(BusError::Canceled),
    }
}

/// Error recorded against the controller's directives when it detaches
fn failure_cause(result: &Result<(), BusError>) -> Option<ResolveError> {
    match result {
        Err(e) if !e.is_canceled() => Some(ResolveError::failed(e)),
        _ => None,
    }
}

/// Detaches a controller added with [`Bus::add_controller`]. Idempotent.
#[must_use = "dropping the release leaves the controller attached"]
pub struct ControllerRelease {
    key: u64,
    bus: Bus,
    released: AtomicBool,
}

impl ControllerRelease {
    /// Cancel the controller's task and remove its handler
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(detached) = self.bus.detach(self.key, None) {
            self.bus.spawn_close(detached);
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
