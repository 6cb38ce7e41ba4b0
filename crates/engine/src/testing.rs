// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test doubles for directives and references, and a log sink
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::controller::DirectiveController;
use crate::handler::{FnHandler, HandlerId};
use crate::instance::DirectiveInstance;
use crate::reference::ReferenceHandler;
use crate::resolver::Resolver;
use rebus_core::{
    AttachedValue, BusError, DebugValues, Directive, ResolveError, ValueId, ValueOptions,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

/// Directive keyed by a string. Equal keys are equivalent; a higher
/// revision supersedes a lower one.
#[derive(Clone, Debug, Default)]
pub struct TestDirective {
    pub key: String,
    pub revision: u32,
    pub options: ValueOptions,
    pub invalid: bool,
}

impl TestDirective {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn with_revision(mut self, revision: u32) -> Self {
        self.revision = revision;
        self
    }

    pub fn with_options(mut self, options: ValueOptions) -> Self {
        self.options = options;
        self
    }

    pub fn invalid(mut self) -> Self {
        self.invalid = true;
        self
    }

    pub fn shared(self) -> Arc<dyn Directive> {
        Arc::new(self)
    }
}

impl Directive for TestDirective {
    fn name(&self) -> &str {
        "TestDirective"
    }

    fn validate(&self) -> Result<(), BusError> {
        if self.invalid {
            return Err(BusError::InvalidDirective(format!(
                "key {} marked invalid",
                self.key
            )));
        }
        Ok(())
    }

    fn value_options(&self) -> ValueOptions {
        self.options
    }

    fn is_equivalent(&self, other: &dyn Directive) -> bool {
        other
            .downcast_ref::<TestDirective>()
            .is_some_and(|o| o.key == self.key)
    }

    fn supersedes(&self, other: &dyn Directive) -> bool {
        other
            .downcast_ref::<TestDirective>()
            .is_some_and(|o| self.revision > o.revision)
    }

    fn debug_values(&self) -> DebugValues {
        let mut values = DebugValues::new();
        values.insert("key".to_string(), vec![self.key.clone()]);
        values
    }
}

/// Notification seen by a [`RecordingHandler`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefEvent {
    Added(ValueId),
    Removed(ValueId),
    Disposed,
}

/// Reference handler recording every notification in order
#[derive(Clone, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<RefEvent>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> Arc<dyn ReferenceHandler> {
        Arc::new(self.clone())
    }

    pub fn events(&self) -> Vec<RefEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn added(&self) -> Vec<ValueId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RefEvent::Added(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn disposed(&self) -> bool {
        self.events().contains(&RefEvent::Disposed)
    }

    fn push(&self, event: RefEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

impl ReferenceHandler for RecordingHandler {
    fn handle_value_added(&self, _instance: &DirectiveInstance, value: &AttachedValue) {
        self.push(RefEvent::Added(value.id()));
    }

    fn handle_value_removed(&self, _instance: &DirectiveInstance, value: &AttachedValue) {
        self.push(RefEvent::Removed(value.id()));
    }

    fn handle_instance_disposed(&self, _instance: &DirectiveInstance) {
        self.push(RefEvent::Disposed);
    }
}

/// Wait for the next idle transition (or the current idle state), returning
/// its errors. `None` on timeout.
pub async fn wait_idle(instance: &DirectiveInstance, timeout: Duration) -> Option<Vec<ResolveError>> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let release = instance.add_idle_callback(move |errs| {
        let _ = tx.send(errs.to_vec());
    });
    let result = tokio::time::timeout(timeout, rx.recv()).await.ok().flatten();
    release.release();
    result
}

/// Poll `cond` until it holds, yielding to the runtime between checks.
/// Returns false if it did not hold within `timeout`.
pub async fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    true
}

/// Register a handler answering every directive with the resolvers `make`
/// builds for it
pub fn add_resolver_handler(
    controller: &DirectiveController,
    make: impl Fn(&DirectiveInstance) -> Vec<Arc<dyn Resolver>> + Send + Sync + 'static,
) -> Result<HandlerId, BusError> {
    controller.add_handler(Arc::new(FnHandler::new(
        move |instance: &DirectiveInstance| Ok(make(instance)),
    )))
}

/// Log sink for a `tracing_subscriber::fmt` subscriber; clones share one
/// buffer
#[derive(Clone, Default)]
pub struct CapturedLogs {
    logs: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    pub fn contents(&self) -> String {
        let logs = self.logs.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&logs).to_string()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.logs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
