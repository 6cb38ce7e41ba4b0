//! A controller failing does not take the engine down

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test]
async fn panicking_controller_is_detached_and_fails_its_directives() {
    let bus = bus();
    let token = CancellationToken::new();
    let controller = BoilerplateController::new(Answer::Hang);
    let (exit_tx, exit_rx) = tokio::sync::oneshot::channel();
    let _release = bus
        .add_controller(
            &token,
            Arc::clone(&controller) as Arc<dyn Controller>,
            Some(Box::new(move |result: Result<(), BusError>| {
                let _ = exit_tx.send(result);
            })),
        )
        .unwrap();

    let (instance, _reference) = bus
        .add_directive(
            Boilerplate::new("hello world").shared(),
            RecordingHandler::new().shared(),
        )
        .unwrap();
    assert!(!instance.is_idle());

    let idle = {
        let instance = instance.clone();
        tokio::spawn(async move { wait_idle(&instance, WAIT).await })
    };
    tokio::task::yield_now().await;
    controller.trigger.notify_one();

    let exit = tokio::time::timeout(WAIT, exit_rx).await.unwrap().unwrap();
    let Err(BusError::ControllerPanicked { id, message }) = exit.clone() else {
        panic!("expected a controller panic, got {exit:?}");
    };
    assert_eq!(id, "rebus/example/boilerplate");
    assert_eq!(message, "boilerplate controller lost its state");

    let errors = idle.await.unwrap().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("boilerplate controller lost its state"));
    assert!(bus.get_controllers().is_empty());
    assert_eq!(bus.directive_controller().handler_count(), 0);
}

#[tokio::test]
async fn engine_keeps_serving_after_a_controller_panics() {
    let bus = bus();
    let token = CancellationToken::new();
    let faulty = BoilerplateController::new(Answer::Hang);
    let (exit_tx, exit_rx) = tokio::sync::oneshot::channel();
    let _faulty = bus
        .add_controller(
            &token,
            Arc::clone(&faulty) as Arc<dyn Controller>,
            Some(Box::new(move |result: Result<(), BusError>| {
                let _ = exit_tx.send(result);
            })),
        )
        .unwrap();
    faulty.trigger.notify_one();
    let exit = tokio::time::timeout(WAIT, exit_rx).await.unwrap().unwrap();
    assert!(matches!(exit, Err(BusError::ControllerPanicked { .. })));

    let _healthy = bus
        .add_controller(&token, BoilerplateController::new(Answer::Length), None)
        .unwrap();
    let found = exec_one_off::<usize>(
        bus.directive_controller(),
        &token,
        Boilerplate::new("abc").shared(),
        OneOffOptions::new(),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(found.value.value, 3);
    found.reference.release();
}
