mod support;

use cua_operator::action::{Action, Coordinates, ScrollDirection};
use cua_operator::error::{EnvironmentError, ErrorKind, OperatorError};
use cua_operator::executor::ActionExecutor;
use std::time::Duration;
use support::{Call, RecordingEnvironment};

fn scroll(direction: ScrollDirection) -> Action {
    Action::Scroll {
        thought: "see more".into(),
        coordinates: Coordinates::new(10.0, 20.0),
        direction,
    }
}

#[tokio::test]
async fn scroll_moves_then_wheels_with_signed_delta() {
    let env = RecordingEnvironment::new();
    let executor = ActionExecutor::default();

    let down = executor.execute(&env, &scroll(ScrollDirection::Down)).await.unwrap();
    assert!(down.continue_loop);
    executor.execute(&env, &scroll(ScrollDirection::Up)).await.unwrap();

    assert_eq!(
        env.calls(),
        vec![
            Call::Move(10.0, 20.0),
            Call::Scroll(10.0, 20.0, 100),
            Call::Move(10.0, 20.0),
            Call::Scroll(10.0, 20.0, -100),
        ]
    );
}

#[tokio::test]
async fn wait_uses_declared_or_default_duration() {
    let env = RecordingEnvironment::new();
    let executor = ActionExecutor::default();

    executor
        .execute(&env, &Action::Wait { thought: "load".into(), duration_ms: None })
        .await
        .unwrap();
    executor
        .execute(&env, &Action::Wait { thought: "load".into(), duration_ms: Some(300) })
        .await
        .unwrap();

    assert_eq!(
        env.calls(),
        vec![
            Call::Wait(Duration::from_millis(2000)),
            Call::Wait(Duration::from_millis(300)),
        ]
    );
}

#[tokio::test]
async fn done_stops_without_touching_the_surface() {
    let env = RecordingEnvironment::new();
    let out = ActionExecutor::default()
        .execute(&env, &support::done("searched"))
        .await
        .unwrap();

    assert!(!out.continue_loop);
    assert_eq!(out.summary.as_deref(), Some("searched"));
    assert!(env.calls().is_empty());
}

#[tokio::test]
async fn unknown_is_skipped_and_loop_continues() {
    let env = RecordingEnvironment::new();
    let out = ActionExecutor::default()
        .execute(&env, &support::unknown("drag"))
        .await
        .unwrap();

    assert!(out.continue_loop);
    assert!(env.calls().is_empty());
}

#[tokio::test]
async fn primitive_failure_is_reported_with_its_cause() {
    let env = RecordingEnvironment {
        reject_typing: true,
        ..RecordingEnvironment::default()
    };
    let failed = ActionExecutor::default()
        .execute(&env, &support::type_text("hello"))
        .await
        .unwrap_err();

    assert_eq!(failed.action, "type");
    assert!(matches!(failed.source, EnvironmentError::InputRejected(_)));
    assert_eq!(OperatorError::from(failed).kind(), ErrorKind::ActionExecutionFailed);
}

#[tokio::test]
async fn click_and_keys_map_to_single_primitives() {
    let env = RecordingEnvironment::new();
    let executor = ActionExecutor::new(250, Duration::from_millis(10));

    executor.execute(&env, &support::click(0.5, 0.25)).await.unwrap();
    executor.execute(&env, &support::keypress("Enter")).await.unwrap();
    executor.execute(&env, &support::type_text("X")).await.unwrap();

    assert_eq!(
        env.calls(),
        vec![
            Call::Click(0.5, 0.25),
            Call::Key("Enter".into()),
            Call::Type("X".into()),
        ]
    );
}
