//! Call/return helpers over a running bus

use crate::prelude::*;
use similar_asserts::assert_eq;

fn serving_bus(token: &CancellationToken) -> (Bus, rebus_bus::ControllerRelease) {
    let bus = bus();
    let release = bus
        .add_controller(token, BoilerplateController::new(Answer::Length), None)
        .unwrap();
    (bus, release)
}

#[tokio::test]
async fn wait_idle_then_release() {
    let token = CancellationToken::new();
    let (bus, _release) = serving_bus(&token);

    exec_wait_idle(
        bus.directive_controller(),
        &token,
        Boilerplate::new("done").shared(),
    )
    .await
    .unwrap();
    assert!(bus.get_directives().is_empty());
}

#[tokio::test]
async fn collect_gathers_every_value() {
    let token = CancellationToken::new();
    let (bus, _release) = serving_bus(&token);

    let collected = exec_collect_values::<usize>(
        bus.directive_controller(),
        &token,
        Boilerplate::new("four").shared(),
        CollectOptions { until_idle: true },
    )
    .await
    .unwrap();
    let values: Vec<usize> = collected.values.iter().map(|v| v.value).collect();
    assert_eq!(values, vec![4]);
    collected.reference.release();
}

#[tokio::test]
async fn refcount_holds_directive_until_last_release() {
    let token = CancellationToken::new();
    let (bus, _release) = serving_bus(&token);
    let counts = KeyedRefCount::new(bus.directive_controller().clone(), |message: &String| {
        Boilerplate::new(message.clone()).shared()
    });

    let first = counts.acquire("shared".to_string()).unwrap();
    let second = counts.acquire("shared".to_string()).unwrap();
    assert_eq!(bus.get_directives().len(), 1);

    first.release();
    assert_eq!(bus.get_directives().len(), 1);
    second.release();
    assert!(bus.get_directives().is_empty());
}

#[tokio::test]
async fn watcher_sees_resolved_value() {
    let token = CancellationToken::new();
    let (bus, _release) = serving_bus(&token);

    let watcher = DirectiveWatcher::<usize>::start(
        bus.directive_controller(),
        Boilerplate::new("watch me").shared(),
    )
    .unwrap();
    let (_, latest) = tokio::time::timeout(WAIT, watcher.wait_change(&token, 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.map(|v| v.value), Some(8));
    watcher.release();
}

/// Asks for twice a message's length, derived from the [`Boilerplate`]
/// answer for the same message
#[derive(Debug)]
struct Doubled(String);

impl Directive for Doubled {
    fn name(&self) -> &str {
        "Doubled"
    }

    fn is_equivalent(&self, other: &dyn Directive) -> bool {
        other.downcast_ref::<Doubled>().is_some_and(|o| o.0 == self.0)
    }
}

#[tokio::test]
async fn transform_resolver_derives_values_from_another_directive() {
    let token = CancellationToken::new();
    let (bus, _release) = serving_bus(&token);
    let engine = bus.directive_controller().clone();
    bus.directive_controller()
        .add_handler(Arc::new(FnHandler::new(move |instance: &DirectiveInstance| {
            let Some(doubled) = instance.directive().downcast_ref::<Doubled>() else {
                return Ok(Vec::new());
            };
            Ok(vec![Arc::new(TransformResolver::new(
                engine.clone(),
                Boilerplate::new(doubled.0.clone()).shared(),
                |value: &AttachedValue| value.downcast_ref::<usize>().map(|n| into_value(n * 2)),
            )) as Arc<dyn Resolver>])
        })))
        .unwrap();

    let found = exec_one_off::<usize>(
        bus.directive_controller(),
        &token,
        Arc::new(Doubled("abc".to_string())),
        OneOffOptions::new(),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(found.value.value, 6);
    found.reference.release();
}
