// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types shared by the engine, the bus and the access helpers

use std::fmt;
use thiserror::Error;

/// Error returned by a resolver attempt.
///
/// Recorded against the instance and handed to idle callbacks, so it must be
/// cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("context canceled")]
    Canceled,
    #[error("{message}")]
    Failed { message: String },
}

impl ResolveError {
    pub fn failed(err: impl fmt::Display) -> Self {
        ResolveError::Failed {
            message: err.to_string(),
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, ResolveError::Canceled)
    }
}

/// Errors surfaced to engine and bus callers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("invalid directive: {0}")]
    InvalidDirective(String),
    #[error("directive disposed")]
    DirectiveDisposed,
    #[error("context canceled")]
    Canceled,
    #[error("resolver error: {0}")]
    Resolver(#[from] ResolveError),
    #[error("handler error: {0}")]
    Handler(String),
    #[error("controller {id} panicked: {message}")]
    ControllerPanicked { id: String, message: String },
    #[error("engine closed")]
    Closed,
}

impl BusError {
    pub fn is_canceled(&self) -> bool {
        matches!(
            self,
            BusError::Canceled | BusError::Resolver(ResolveError::Canceled)
        )
    }
}

impl From<BusError> for ResolveError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Canceled => ResolveError::Canceled,
            BusError::Resolver(inner) => inner,
            other => ResolveError::failed(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_error_from_bus_error() {
        assert_eq!(ResolveError::from(BusError::Canceled), ResolveError::Canceled);
        assert_eq!(
            ResolveError::from(BusError::DirectiveDisposed),
            ResolveError::failed("directive disposed")
        );
        let inner = ResolveError::failed("boom");
        assert_eq!(ResolveError::from(BusError::Resolver(inner.clone())), inner);
    }

    #[test]
    fn panic_error_message() {
        let err = BusError::ControllerPanicked {
            id: "demo/ctrl".into(),
            message: "oops".into(),
        };
        assert_eq!(err.to_string(), "controller demo/ctrl panicked: oops");
    }

    #[test]
    fn cancellation_detection() {
        assert!(BusError::Canceled.is_canceled());
        assert!(BusError::Resolver(ResolveError::Canceled).is_canceled());
        assert!(!BusError::DirectiveDisposed.is_canceled());
    }
}
