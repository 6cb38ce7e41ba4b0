// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller bus settings

use serde::{Deserialize, Serialize};

/// Settings for attaching and detaching controllers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Detach a controller whose task returns `Ok(())`.
    ///
    /// Off by default so handler-only controllers stay attached after their
    /// task completes.
    pub detach_on_clean_exit: bool,
    /// Call `Controller::close` when a controller is detached
    pub close_on_release: bool,
}

impl BusConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detach_on_clean_exit(mut self, enabled: bool) -> Self {
        self.detach_on_clean_exit = enabled;
        self
    }

    pub fn with_close_on_release(mut self, enabled: bool) -> Self {
        self.close_on_release = enabled;
        self
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            detach_on_clean_exit: false,
            close_on_release: true,
        }
    }
}
