//! Reference release, grace periods and engine shutdown

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test(start_paused = true)]
async fn grace_period_delays_disposal() {
    let bus = bus();
    let refs = RecordingHandler::new();
    let (instance, reference) = bus
        .add_directive(
            Boilerplate::new("linger")
                .with_options(ValueOptions::new().with_unref_dispose(Duration::from_secs(10)))
                .shared(),
            refs.shared(),
        )
        .unwrap();

    reference.release();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!instance.is_released());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(instance.is_released());
    assert!(bus.get_directives().is_empty());
}

#[tokio::test(start_paused = true)]
async fn new_reference_cancels_pending_disposal() {
    let bus = bus();
    let directive = || {
        Boilerplate::new("linger")
            .with_options(ValueOptions::new().with_unref_dispose(Duration::from_secs(10)))
            .shared()
    };
    let (instance, first) = bus
        .add_directive(directive(), RecordingHandler::new().shared())
        .unwrap();
    first.release();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let (again, second) = bus
        .add_directive(directive(), RecordingHandler::new().shared())
        .unwrap();
    assert_eq!(again.id(), instance.id());
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(!instance.is_released());
    second.release();
}

#[tokio::test]
async fn disposal_notifies_every_reference_once() {
    let bus = bus();
    let first = RecordingHandler::new();
    let second = RecordingHandler::new();
    let (instance, _a) = bus
        .add_directive(Boilerplate::new("x").shared(), first.shared())
        .unwrap();
    let (_, _b) = bus
        .add_directive(Boilerplate::new("x").shared(), second.shared())
        .unwrap();

    instance.close();
    instance.close();
    assert_eq!(first.events(), vec![RefEvent::Disposed]);
    assert_eq!(second.events(), vec![RefEvent::Disposed]);
}

#[tokio::test]
async fn closing_the_bus_disposes_everything() {
    let bus = bus();
    let token = CancellationToken::new();
    let _release = bus
        .add_controller(&token, BoilerplateController::new(Answer::Hang), None)
        .unwrap();
    let refs = RecordingHandler::new();
    let (instance, _reference) = bus
        .add_directive(Boilerplate::new("x").shared(), refs.shared())
        .unwrap();

    bus.close().await;
    assert!(instance.is_released());
    assert!(refs.disposed());
    assert!(bus.get_controllers().is_empty());
    assert!(matches!(
        bus.add_directive(Boilerplate::new("y").shared(), refs.shared()),
        Err(BusError::Closed)
    ));
}
