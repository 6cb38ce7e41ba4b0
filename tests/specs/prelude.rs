//! Shared fixtures for the behavioral specs

pub use async_trait::async_trait;
pub use rebus_access::*;
pub use rebus_bus::{Bus, Controller, ControllerInfo};
pub use rebus_core::*;
pub use rebus_engine::testing::{eventually, wait_idle, RecordingHandler, RefEvent};
pub use rebus_engine::*;
pub use std::sync::Arc;
pub use std::time::Duration;
pub use tokio_util::sync::CancellationToken;

use tokio::sync::Notify;

pub const WAIT: Duration = Duration::from_secs(5);

/// Asks for the length of a message
#[derive(Clone, Debug)]
pub struct Boilerplate {
    pub message: String,
    pub options: ValueOptions,
}

impl Boilerplate {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            options: ValueOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ValueOptions) -> Self {
        self.options = options;
        self
    }

    pub fn shared(self) -> Arc<dyn Directive> {
        Arc::new(self)
    }
}

impl Directive for Boilerplate {
    fn name(&self) -> &str {
        "Boilerplate"
    }

    fn validate(&self) -> Result<(), BusError> {
        if self.message.is_empty() {
            return Err(BusError::InvalidDirective("message cannot be empty".into()));
        }
        Ok(())
    }

    fn value_options(&self) -> ValueOptions {
        self.options
    }

    fn is_equivalent(&self, other: &dyn Directive) -> bool {
        other
            .downcast_ref::<Boilerplate>()
            .is_some_and(|o| o.message == self.message)
    }

    fn debug_values(&self) -> DebugValues {
        let mut values = DebugValues::new();
        values.insert("message".to_string(), vec![self.message.clone()]);
        values
    }
}

/// How a [`BoilerplateController`] answers directives
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Answer {
    /// Add the message length, then finish
    Length,
    /// Keep resolving until canceled without adding anything
    Hang,
}

/// Answers [`Boilerplate`] directives; its task panics when triggered
pub struct BoilerplateController {
    answer: Answer,
    pub trigger: Notify,
}

impl BoilerplateController {
    pub fn new(answer: Answer) -> Arc<Self> {
        Arc::new(Self {
            answer,
            trigger: Notify::new(),
        })
    }
}

impl DirectiveHandler for BoilerplateController {
    fn handle_directive(
        &self,
        instance: &DirectiveInstance,
    ) -> Result<Vec<Arc<dyn Resolver>>, BusError> {
        let Some(directive) = instance.directive().downcast_ref::<Boilerplate>() else {
            return Ok(Vec::new());
        };
        let resolver: Arc<dyn Resolver> = match self.answer {
            Answer::Length => Arc::new(ValueResolver::single(directive.message.len())),
            Answer::Hang => Arc::new(FnResolver::new(
                |token: CancellationToken, _handle: ResolverHandle| async move {
                    token.cancelled().await;
                    Err::<(), _>(ResolveError::Canceled)
                },
            )),
        };
        Ok(vec![resolver])
    }
}

#[async_trait]
impl Controller for BoilerplateController {
    fn info(&self) -> ControllerInfo {
        ControllerInfo::new("rebus/example/boilerplate", "0.1.0")
    }

    async fn execute(&self, token: CancellationToken) -> Result<(), BusError> {
        tokio::select! {
            _ = token.cancelled() => Ok(()),
            _ = self.trigger.notified() => panic!("boilerplate controller lost its state"),
        }
    }
}

/// A bus with a fresh engine and default settings
pub fn bus() -> Bus {
    Bus::from_config(&RebusConfig::default())
}
