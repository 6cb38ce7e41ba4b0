// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blocking directive execution helpers
//!
//! Each helper submits a directive, follows it through a [`Broadcast`] fed by
//! reference and idle callbacks, and turns the outcome into a plain return
//! value.

use crate::broadcast::Broadcast;
use rebus_core::{AttachedValue, BusError, Directive, ResolveError, TypedValue};
use rebus_engine::{
    CallbackRelease, DirectiveController, DirectiveInstance, Reference, ReferenceHandler,
};
use std::any::Any;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type Filter<V> = Arc<dyn Fn(&V) -> bool + Send + Sync>;

/// Options for [`exec_one_off`]
pub struct OneOffOptions<V> {
    /// Return `None` once the directive goes idle without a matching value
    pub return_if_idle: bool,
    filter: Option<Filter<V>>,
}

impl<V> Default for OneOffOptions<V> {
    fn default() -> Self {
        Self {
            return_if_idle: false,
            filter: None,
        }
    }
}

impl<V> OneOffOptions<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn return_if_idle(mut self) -> Self {
        self.return_if_idle = true;
        self
    }

    /// Only accept values for which `filter` returns true
    pub fn with_filter(mut self, filter: impl Fn(&V) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }
}

/// First value produced for a directive, with the reference keeping it
/// alive. Release the reference when done with the value.
#[derive(Debug)]
pub struct OneOff<V> {
    pub value: TypedValue<V>,
    pub instance: DirectiveInstance,
    pub reference: Reference,
}

/// What a helper has observed so far
struct Observed<S> {
    state: S,
    /// Errors from the most recent idle transition, if any happened
    idle: Option<Vec<ResolveError>>,
    disposed: bool,
}

impl<S: Default> Default for Observed<S> {
    fn default() -> Self {
        Self {
            state: S::default(),
            idle: None,
            disposed: false,
        }
    }
}

impl<S> Observed<S> {
    /// First recorded error of the last idle transition
    fn idle_error(&self) -> Option<BusError> {
        self.idle
            .as_ref()
            .and_then(|errs| errs.first())
            .map(|e| BusError::Resolver(e.clone()))
    }
}

/// Reference handler feeding value changes into a [`Broadcast`]
struct Observer<S> {
    cell: Arc<Broadcast<Observed<S>>>,
    on_added: Box<dyn Fn(&mut S, &AttachedValue) + Send + Sync>,
    on_removed: Box<dyn Fn(&mut S, &AttachedValue) + Send + Sync>,
}

impl<S: Send + 'static> ReferenceHandler for Observer<S> {
    fn handle_value_added(&self, _instance: &DirectiveInstance, value: &AttachedValue) {
        self.cell.update(|o| (self.on_added)(&mut o.state, value));
    }

    fn handle_value_removed(&self, _instance: &DirectiveInstance, value: &AttachedValue) {
        self.cell.update(|o| (self.on_removed)(&mut o.state, value));
    }

    fn handle_instance_disposed(&self, _instance: &DirectiveInstance) {
        self.cell.update(|o| o.disposed = true);
    }
}

/// A submitted directive followed through a [`Broadcast`]
struct Observation<S> {
    cell: Arc<Broadcast<Observed<S>>>,
    instance: DirectiveInstance,
    reference: Reference,
    idle: CallbackRelease,
}

/// Submit `directive` with an observer reference and follow its idle
/// transitions
fn observe<S>(
    controller: &DirectiveController,
    directive: Arc<dyn Directive>,
    on_added: impl Fn(&mut S, &AttachedValue) + Send + Sync + 'static,
    on_removed: impl Fn(&mut S, &AttachedValue) + Send + Sync + 'static,
) -> Result<Observation<S>, BusError>
where
    S: Default + Send + 'static,
{
    let cell = Arc::new(Broadcast::new(Observed::<S>::default()));
    let observer = Observer {
        cell: Arc::clone(&cell),
        on_added: Box::new(on_added),
        on_removed: Box::new(on_removed),
    };
    let (instance, reference) = controller.add_directive(directive, Arc::new(observer))?;
    let idle_cell = Arc::clone(&cell);
    let idle = instance.add_idle_callback(move |errs| {
        idle_cell.update(|o| o.idle = Some(errs.to_vec()));
    });
    Ok(Observation {
        cell,
        instance,
        reference,
        idle,
    })
}

/// Submit a directive and wait for its first value of type `V`.
///
/// Returns an error if the directive goes idle with a recorded error before
/// a value arrives, [`BusError::DirectiveDisposed`] if it is disposed, or
/// [`BusError::Canceled`] if `token` is canceled. With `return_if_idle`, an
/// error-free idle transition without a value yields `Ok(None)`.
pub async fn exec_one_off<V>(
    controller: &DirectiveController,
    token: &CancellationToken,
    directive: Arc<dyn Directive>,
    options: OneOffOptions<V>,
) -> Result<Option<OneOff<V>>, BusError>
where
    V: Any + Clone + Send + Sync,
{
    let filter = options.filter.clone();
    let obs = observe(
        controller,
        directive,
        move |first: &mut Option<TypedValue<V>>, value| {
            if first.is_some() {
                return;
            }
            if let Some(typed) = value.typed::<V>() {
                if filter.as_ref().is_none_or(|f| f(&typed.value)) {
                    *first = Some(typed);
                }
            }
        },
        |_, _| {},
    )?;

    let result = obs
        .cell
        .wait(token, |o| {
            if let Some(value) = &o.state {
                return Some(Ok(Some(value.clone())));
            }
            if let Some(err) = o.idle_error() {
                return Some(Err(err));
            }
            if o.idle.is_some() && options.return_if_idle {
                return Some(Ok(None));
            }
            if o.disposed {
                return Some(Err(BusError::DirectiveDisposed));
            }
            None
        })
        .await
        .and_then(|r| r);
    obs.idle.release();

    match result {
        Ok(Some(value)) => Ok(Some(OneOff {
            value,
            instance: obs.instance,
            reference: obs.reference,
        })),
        other => {
            obs.reference.release();
            other.map(|_| None)
        }
    }
}

/// Options for [`exec_collect_values`]
#[derive(Clone, Copy, Debug, Default)]
pub struct CollectOptions {
    /// Return at the first idle transition instead of when `token` is canceled
    pub until_idle: bool,
}

/// Values gathered by [`exec_collect_values`], with the reference keeping
/// them alive
#[derive(Debug)]
pub struct Collected<V> {
    pub values: Vec<TypedValue<V>>,
    pub instance: DirectiveInstance,
    pub reference: Reference,
}

/// Submit a directive and gather its values of type `V`.
///
/// Values removed while collecting are dropped from the result. By default
/// collection runs until `token` is canceled; with `until_idle` it ends at
/// the first idle transition, failing if that transition recorded an error.
pub async fn exec_collect_values<V>(
    controller: &DirectiveController,
    token: &CancellationToken,
    directive: Arc<dyn Directive>,
    options: CollectOptions,
) -> Result<Collected<V>, BusError>
where
    V: Any + Clone + Send + Sync,
{
    let obs = observe(
        controller,
        directive,
        |values: &mut Vec<TypedValue<V>>, value| {
            if let Some(typed) = value.typed::<V>() {
                values.push(typed);
            }
        },
        |values, value| values.retain(|v| v.id != value.id()),
    )?;

    let waited = obs
        .cell
        .wait(token, |o| {
            if o.disposed {
                return Some(Err(BusError::DirectiveDisposed));
            }
            if !options.until_idle || o.idle.is_none() {
                return None;
            }
            match o.idle_error() {
                Some(err) => Some(Err(err)),
                None => Some(Ok(())),
            }
        })
        .await;
    obs.idle.release();

    let finished = match waited {
        Ok(Ok(())) => Ok(()),
        Err(BusError::Canceled) if !options.until_idle => Ok(()),
        Ok(Err(e)) | Err(e) => Err(e),
    };
    match finished {
        Ok(()) => Ok(Collected {
            values: obs.cell.with(|o| o.state.clone()),
            instance: obs.instance,
            reference: obs.reference,
        }),
        Err(e) => {
            obs.reference.release();
            Err(e)
        }
    }
}

/// Submit a directive, wait for it to go idle, then release it.
///
/// Fails with the first error recorded at that idle transition.
pub async fn exec_wait_idle(
    controller: &DirectiveController,
    token: &CancellationToken,
    directive: Arc<dyn Directive>,
) -> Result<(), BusError> {
    let obs = observe(controller, directive, |_: &mut (), _| {}, |_, _| {})?;
    let result = obs
        .cell
        .wait(token, |o| {
            if let Some(err) = o.idle_error() {
                return Some(Err(err));
            }
            if o.idle.is_some() {
                return Some(Ok(()));
            }
            if o.disposed {
                return Some(Err(BusError::DirectiveDisposed));
            }
            None
        })
        .await
        .and_then(|r| r);
    obs.idle.release();
    obs.reference.release();
    result
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
