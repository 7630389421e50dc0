// Integration tests for the voice session controller, driven through the
// fallback simulator (no credential configured, so no network is touched).
// Simulator timing is shrunk to keep the tests fast.

use std::time::Duration;

use heallink_voice::{
    BackendMode, ErrorKind, SessionConfig, SessionController, SessionSnapshot, SessionState,
    SimulatorTiming, Speaker,
};

fn fast_config() -> SessionConfig {
    SessionConfig {
        api_key: None, // forces fallback at initiate()
        timing: SimulatorTiming {
            greeting_delay: Duration::from_millis(10),
            thinking_delay: Duration::from_millis(40),
            listen_min: Duration::from_millis(30),
            listen_max: Duration::from_millis(50),
            speaking_min: Duration::from_millis(20),
            speaking_max: Duration::from_millis(30),
            user_level_interval: Duration::from_millis(5),
            ai_level_interval: Duration::from_millis(5),
        },
        ..Default::default()
    }
}

/// Wait until the published snapshot satisfies `cond`, or panic after
/// `timeout`.
async fn wait_for(
    controller: &SessionController,
    timeout: Duration,
    mut cond: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = controller.subscribe();
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let snapshot = rx.borrow_and_update().clone();
        if cond(&snapshot) {
            return snapshot;
        }

        match tokio::time::timeout_at(deadline, rx.changed()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => panic!("session event loop terminated"),
            Err(_) => panic!("timed out waiting for snapshot condition"),
        }
    }
}

/// Wait until the scripted greeting has been spoken and the session is back
/// in idle.
async fn wait_for_greeting(controller: &SessionController) -> SessionSnapshot {
    wait_for(controller, Duration::from_secs(2), |s| {
        s.turns.len() == 1 && s.state == SessionState::Idle && !s.is_speaking
    })
    .await
}

#[tokio::test]
async fn initiate_without_credential_falls_back() {
    let controller = SessionController::new(fast_config());

    let mode = controller.initiate().await.expect("initiate must not fail");
    assert_eq!(mode, BackendMode::Fallback);

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(snapshot.mode, Some(BackendMode::Fallback));

    let record = snapshot.last_error.expect("configuration error recorded");
    assert_eq!(record.kind, ErrorKind::Configuration);
    assert_eq!(record.occurred_during, SessionState::Initiating);
    assert!(snapshot.error_message.is_some());
}

#[tokio::test]
async fn fallback_greeting_arrives_and_speaking_is_observed() {
    let controller = SessionController::new(fast_config());
    controller.initiate().await.unwrap();

    // The greeting turn shows up after the fixed delay...
    let snapshot = wait_for(&controller, Duration::from_secs(2), |s| !s.turns.is_empty()).await;
    assert_eq!(snapshot.turns[0].speaker, Speaker::Ai);
    assert!(snapshot.turns[0].text.contains("Healbot"));
    assert_eq!(snapshot.turns[0].sequence, 1);

    // ...with an assistant speaking window around it.
    wait_for(&controller, Duration::from_secs(2), |s| s.is_speaking).await;
    wait_for_greeting(&controller).await;
}

#[tokio::test]
async fn fallback_turn_appends_one_user_and_one_ai_turn() {
    let controller = SessionController::new(fast_config());
    controller.initiate().await.unwrap();
    wait_for_greeting(&controller).await;

    controller.start_turn().await.unwrap();

    // Listening window runs, then the canned utterance lands.
    let snapshot = wait_for(&controller, Duration::from_secs(2), |s| s.turns.len() == 2).await;
    assert_eq!(snapshot.turns[1].speaker, Speaker::User);

    // Speaking is observed between the user turn and the AI turn.
    wait_for(&controller, Duration::from_secs(2), |s| {
        s.state == SessionState::Speaking
    })
    .await;

    let snapshot = wait_for(&controller, Duration::from_secs(2), |s| s.turns.len() == 3).await;
    assert_eq!(snapshot.turns[2].speaker, Speaker::Ai);
    assert!(!snapshot.turns[2].text.is_empty());

    // Sequences are strictly increasing with no gaps.
    let sequences: Vec<u64> = snapshot.turns.iter().map(|t| t.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);

    // The turn ends back in idle with no extra turns appended.
    wait_for(&controller, Duration::from_secs(2), |s| {
        s.state == SessionState::Idle && !s.is_speaking
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.snapshot().turns.len(), 3);
}

#[tokio::test]
async fn start_turn_while_listening_is_a_noop() {
    let controller = SessionController::new(fast_config());
    controller.initiate().await.unwrap();
    wait_for_greeting(&controller).await;

    controller.start_turn().await.unwrap();
    wait_for(&controller, Duration::from_secs(2), |s| {
        s.state == SessionState::Listening
    })
    .await;

    // Second call while already listening: only one window runs.
    controller.start_turn().await.unwrap();

    wait_for(&controller, Duration::from_secs(2), |s| {
        s.turns.len() == 3 && s.state == SessionState::Idle && !s.is_speaking
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Exactly one user and one AI turn beyond the greeting.
    assert_eq!(controller.snapshot().turns.len(), 3);
}

#[tokio::test]
async fn close_is_idempotent_from_any_state() {
    // Never initiated.
    let controller = SessionController::new(fast_config());
    controller.close().await.unwrap();
    assert_eq!(controller.snapshot().state, SessionState::Closed);

    // Mid-turn, called twice.
    let controller = SessionController::new(fast_config());
    controller.initiate().await.unwrap();
    controller.start_turn().await.unwrap();

    controller.close().await.unwrap();
    controller.close().await.unwrap();

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.state, SessionState::Closed);
    assert!(!snapshot.is_listening);
    assert!(!snapshot.is_speaking);
}

#[tokio::test]
async fn close_during_thinking_delay_discards_the_ai_turn() {
    let mut config = fast_config();
    // A long thinking delay leaves a wide window to close mid-phase.
    config.timing.thinking_delay = Duration::from_millis(500);
    let controller = SessionController::new(config);

    controller.initiate().await.unwrap();
    wait_for_greeting(&controller).await;

    controller.start_turn().await.unwrap();
    wait_for(&controller, Duration::from_secs(2), |s| s.turns.len() == 2).await;

    // The simulator is now inside its thinking delay.
    controller.close().await.unwrap();

    tokio::time::sleep(Duration::from_millis(700)).await;

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.state, SessionState::Closed);
    assert_eq!(
        snapshot.turns.len(),
        2,
        "no AI turn may be appended after close"
    );
}

#[tokio::test]
async fn initiate_after_close_starts_a_fresh_session() {
    let controller = SessionController::new(fast_config());
    controller.initiate().await.unwrap();
    wait_for_greeting(&controller).await;
    controller.close().await.unwrap();

    let mode = controller.initiate().await.unwrap();
    assert_eq!(mode, BackendMode::Fallback);

    let snapshot = wait_for(&controller, Duration::from_secs(2), |s| {
        s.state == SessionState::Idle
    })
    .await;
    assert!(
        snapshot.turns.len() <= 1,
        "previous conversation must not carry over"
    );

    // The fresh session greets again and numbers turns from 1.
    let snapshot = wait_for(&controller, Duration::from_secs(2), |s| !s.turns.is_empty()).await;
    assert_eq!(snapshot.turns[0].sequence, 1);
    assert_eq!(snapshot.turns[0].speaker, Speaker::Ai);
}

#[tokio::test]
async fn bars_rest_when_session_is_inactive() {
    let controller = SessionController::new(fast_config());
    controller.initiate().await.unwrap();

    let snapshot = wait_for(&controller, Duration::from_secs(2), |s| {
        !s.is_speaking && !s.is_listening
    })
    .await;
    let rest = snapshot.bar_heights.clone();
    assert_eq!(rest.len(), 30);
    assert!(rest.windows(2).all(|w| w[0] == w[1]), "resting bars are flat");

    // While the assistant speaks, bars rise above the resting height.
    let speaking = wait_for(&controller, Duration::from_secs(2), |s| {
        s.is_speaking && s.bar_heights.iter().any(|&h| h > rest[0])
    })
    .await;
    assert_eq!(speaking.bar_heights.len(), 30);
}
