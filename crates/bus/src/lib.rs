// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rebus-bus: attaches long-running controllers to the directive engine
//!
//! A controller is both a directive handler and a task. The bus registers
//! the handler, runs the task, recovers any panic it raises, and detaches
//! the controller when the task exits.

mod bus;
mod controller;

pub use bus::{Bus, ControllerRelease, ExitCallback};
pub use controller::{Controller, ControllerInfo};
