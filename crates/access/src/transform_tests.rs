// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::exec::{exec_collect_values, exec_one_off, CollectOptions, OneOffOptions};
use rebus_core::BusError;
use rebus_core::into_value;
use rebus_engine::testing::{add_resolver_handler, eventually, RecordingHandler, RefEvent, TestDirective};
use rebus_engine::{FnResolver, ValueResolver};
use std::time::Duration;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

fn key_of(instance: &DirectiveInstance) -> String {
    instance
        .directive()
        .downcast_ref::<TestDirective>()
        .map(|d| d.key.clone())
        .unwrap_or_default()
}

fn times_ten(value: &AttachedValue) -> Option<Value> {
    value.downcast_ref::<u32>().map(|n| into_value(n * 10))
}

/// "parent" is resolved by transforming "sub"; `sub` builds the resolvers
/// for the sub-directive
fn serve(
    controller: &DirectiveController,
    sub: impl Fn() -> Vec<Arc<dyn Resolver>> + Send + Sync + 'static,
) {
    let engine = controller.clone();
    add_resolver_handler(controller, move |instance| match key_of(instance).as_str() {
        "parent" => vec![Arc::new(TransformResolver::new(
            engine.clone(),
            TestDirective::new("sub").shared(),
            times_ten,
        )) as Arc<dyn Resolver>],
        "sub" => sub(),
        _ => Vec::new(),
    })
    .unwrap();
}

#[tokio::test]
async fn maps_sub_directive_values_and_goes_idle() {
    let controller = DirectiveController::default();
    serve(&controller, || {
        vec![Arc::new(ValueResolver::new(vec![
            into_value(1u32),
            into_value("skipped"),
            into_value(2u32),
        ])) as Arc<dyn Resolver>]
    });

    let collected = exec_collect_values::<u32>(
        &controller,
        &CancellationToken::new(),
        TestDirective::new("parent").shared(),
        CollectOptions { until_idle: true },
    )
    .await
    .unwrap();

    let values: Vec<u32> = collected.values.iter().map(|v| v.value).collect();
    assert_eq!(values, vec![10, 20]);
    collected.reference.release();
}

#[tokio::test]
async fn removal_from_sub_directive_propagates() {
    let controller = DirectiveController::default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    serve(&controller, move || {
        let tx = tx.clone();
        vec![Arc::new(FnResolver::new(
            move |token: CancellationToken, handle: ResolverHandle| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(handle);
                    token.cancelled().await;
                    Err::<(), _>(ResolveError::Canceled)
                }
            },
        )) as Arc<dyn Resolver>]
    });

    let refs = RecordingHandler::new();
    let (_parent, reference) = controller
        .add_directive(TestDirective::new("parent").shared(), refs.shared())
        .unwrap();
    let sub = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();

    let id = sub.add_value(into_value(4u32)).unwrap();
    assert!(eventually(WAIT, || refs.added().len() == 1).await);
    let mapped = refs.added()[0];

    sub.remove_value(id);
    assert!(eventually(WAIT, || refs.events().contains(&RefEvent::Removed(mapped))).await);
    reference.release();
}

#[tokio::test]
async fn releasing_parent_releases_sub_directive() {
    let controller = DirectiveController::default();
    serve(&controller, || {
        vec![Arc::new(ValueResolver::single(1u32)) as Arc<dyn Resolver>]
    });

    let refs = RecordingHandler::new();
    let (parent, reference) = controller
        .add_directive(TestDirective::new("parent").shared(), refs.shared())
        .unwrap();
    assert!(eventually(WAIT, || controller.get_directives().len() == 2).await);
    assert!(eventually(WAIT, || refs.added().len() == 1).await);

    reference.release();
    assert!(parent.is_released());
    assert!(eventually(WAIT, || controller.get_directives().is_empty()).await);
}

#[tokio::test]
async fn sub_directive_error_fails_parent() {
    let controller = DirectiveController::default();
    serve(&controller, || {
        vec![Arc::new(FnResolver::new(
            |_token: CancellationToken, _handle: ResolverHandle| async move {
                Err::<(), _>(ResolveError::failed("sub backend down"))
            },
        )) as Arc<dyn Resolver>]
    });

    let err = exec_one_off::<u32>(
        &controller,
        &CancellationToken::new(),
        TestDirective::new("parent").shared(),
        OneOffOptions::new().return_if_idle(),
    )
    .await
    .unwrap_err();

    assert_eq!(err, BusError::Resolver(ResolveError::failed("sub backend down")));
}

#[tokio::test]
async fn parent_follows_sub_directive_out_of_idle() {
    let controller = DirectiveController::default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    serve(&controller, move || {
        let tx = tx.clone();
        vec![Arc::new(FnResolver::new(
            move |token: CancellationToken, handle: ResolverHandle| {
                let tx = tx.clone();
                async move {
                    handle.mark_idle(true);
                    let _ = tx.send(handle);
                    token.cancelled().await;
                    Err::<(), _>(ResolveError::Canceled)
                }
            },
        )) as Arc<dyn Resolver>]
    });

    let refs = RecordingHandler::new();
    let (parent, reference) = controller
        .add_directive(TestDirective::new("parent").shared(), refs.shared())
        .unwrap();
    let sub = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert!(eventually(WAIT, || parent.is_idle()).await);

    sub.mark_idle(false);
    sub.add_value(into_value(5u32)).unwrap();
    assert_eq!(refs.added().len(), 1);
    assert!(!parent.is_idle());

    sub.mark_idle(true);
    assert!(eventually(WAIT, || parent.is_idle()).await);
    reference.release();
}
