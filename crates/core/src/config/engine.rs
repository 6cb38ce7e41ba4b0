// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directive controller settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the directive controller
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Grace period for directives that do not set their own `unref_dispose_dur`
    #[serde(with = "humantime_serde")]
    pub default_unref_dispose: Duration,
    /// Log every accepted and removed value at trace level
    pub trace_values: bool,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_unref_dispose(mut self, dur: Duration) -> Self {
        self.default_unref_dispose = dur;
        self
    }

    pub fn with_trace_values(mut self, enabled: bool) -> Self {
        self.trace_values = enabled;
        self
    }

    /// Grace period to use for a directive's own setting
    pub fn unref_dispose_for(&self, directive_dur: Duration) -> Duration {
        if directive_dur.is_zero() {
            self.default_unref_dispose
        } else {
            directive_dur
        }
    }
}
