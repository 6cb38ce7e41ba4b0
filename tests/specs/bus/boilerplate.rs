//! End-to-end resolution through an attached controller

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test]
async fn one_off_returns_message_length() {
    let bus = bus();
    let token = CancellationToken::new();
    let release = bus
        .add_controller(&token, BoilerplateController::new(Answer::Length), None)
        .unwrap();

    let found = exec_one_off::<usize>(
        bus.directive_controller(),
        &token,
        Boilerplate::new("hello world").shared(),
        OneOffOptions::new(),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(found.value.value, 11);
    assert!(eventually(WAIT, || found.instance.is_idle()).await);
    assert_eq!(wait_idle(&found.instance, WAIT).await, Some(vec![]));

    found.reference.release();
    release.release();
}

#[tokio::test]
async fn controller_is_listed_while_attached() {
    let bus = bus();
    let token = CancellationToken::new();
    let release = bus
        .add_controller(&token, BoilerplateController::new(Answer::Length), None)
        .unwrap();

    let ids: Vec<String> = bus.get_controllers().into_iter().map(|c| c.id).collect();
    assert_eq!(ids, vec!["rebus/example/boilerplate".to_string()]);

    release.release();
    assert!(bus.get_controllers().is_empty());
    assert_eq!(bus.directive_controller().handler_count(), 0);
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let bus = bus();
    let err = bus
        .add_directive(Boilerplate::new("").shared(), RecordingHandler::new().shared())
        .unwrap_err();
    assert_eq!(
        err,
        BusError::InvalidDirective("message cannot be empty".to_string())
    );
    assert!(bus.get_directives().is_empty());
}

#[tokio::test]
async fn directive_info_reports_debug_values() {
    let bus = bus();
    let (_instance, reference) = bus
        .add_directive(
            Boilerplate::new("status").shared(),
            RecordingHandler::new().shared(),
        )
        .unwrap();

    let infos = bus.directive_controller().directive_infos();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].directive.name, "Boilerplate");
    assert_eq!(
        infos[0].directive.debug_values.get("message"),
        Some(&vec!["status".to_string()])
    );
    reference.release();
}
