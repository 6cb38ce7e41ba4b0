// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller contract

use async_trait::async_trait;
use rebus_core::BusError;
use rebus_engine::DirectiveHandler;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Identity of a controller as reported by [`Bus::get_controllers`](crate::Bus::get_controllers)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerInfo {
    pub id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ControllerInfo {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A directive handler with a long-running task.
///
/// `execute` runs for as long as the controller is attached. Controllers that
/// only handle directives can return `Ok(())` right away and stay attached.
#[async_trait]
pub trait Controller: DirectiveHandler {
    fn info(&self) -> ControllerInfo;

    async fn execute(&self, token: CancellationToken) -> Result<(), BusError>;

    /// Release resources once the controller is detached
    async fn close(&self) -> Result<(), BusError> {
        Ok(())
    }
}
