//! Equivalent directives share one instance

use crate::prelude::*;
use similar_asserts::assert_eq;

fn engine_with_lengths() -> Bus {
    let bus = bus();
    bus.directive_controller()
        .add_handler(BoilerplateController::new(Answer::Length))
        .unwrap();
    bus
}

#[tokio::test]
async fn equivalent_directives_share_values() {
    let bus = engine_with_lengths();
    let first = RecordingHandler::new();
    let second = RecordingHandler::new();

    let (a, ref_a) = bus
        .add_directive(Boilerplate::new("shared").shared(), first.shared())
        .unwrap();
    assert_eq!(wait_idle(&a, WAIT).await, Some(vec![]));
    let (b, ref_b) = bus
        .add_directive(Boilerplate::new("shared").shared(), second.shared())
        .unwrap();

    assert_eq!(a.id(), b.id());
    assert_eq!(a.reference_count(), 2);
    assert_eq!(first.added(), second.added());
    assert_eq!(bus.get_directives().len(), 1);

    ref_a.release();
    assert!(!b.is_released());
    ref_b.release();
    assert!(b.is_released());
}

#[tokio::test]
async fn different_messages_get_their_own_instances() {
    let bus = engine_with_lengths();
    let (a, ref_a) = bus
        .add_directive(Boilerplate::new("one").shared(), RecordingHandler::new().shared())
        .unwrap();
    let (b, ref_b) = bus
        .add_directive(Boilerplate::new("three").shared(), RecordingHandler::new().shared())
        .unwrap();
    assert_ne!(a.id(), b.id());

    wait_idle(&a, WAIT).await.unwrap();
    wait_idle(&b, WAIT).await.unwrap();
    assert_eq!(a.values()[0].downcast_ref::<usize>(), Some(&3));
    assert_eq!(b.values()[0].downcast_ref::<usize>(), Some(&5));
    ref_a.release();
    ref_b.release();
}

#[tokio::test]
async fn value_cap_limits_attached_values() {
    let bus = bus();
    bus.directive_controller()
        .add_handler(Arc::new(FnHandler::new(|_: &DirectiveInstance| {
            let values = (0..5u32).map(into_value).collect();
            Ok(vec![Arc::new(ValueResolver::new(values)) as Arc<dyn Resolver>])
        })))
        .unwrap();

    let refs = RecordingHandler::new();
    let (instance, reference) = bus
        .add_directive(
            Boilerplate::new("capped")
                .with_options(ValueOptions::new().with_max_value_count(2))
                .shared(),
            refs.shared(),
        )
        .unwrap();

    assert!(eventually(WAIT, || refs.added().len() == 2).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(instance.values().len(), 2);
    reference.release();
}
