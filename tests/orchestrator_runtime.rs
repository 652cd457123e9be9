//! Orchestrator actor tests on a paused tokio clock.

use std::time::Duration;

use velox::config::Config;
use velox::error::Capability;
use velox::gesture::{KeyAction, KeyEvent};
use velox::orchestrator::Orchestrator;
use velox::platform::simulated::SimulatedHost;
use velox::platform::{HostCapabilities, WakeLockTag};
use velox::session::{SessionState, TransitionReason};
use velox::speech::{EngineEvent, SynthEvent};

async fn state(orchestrator: &Orchestrator) -> SessionState {
    orchestrator.status().await.expect("orchestrator stopped").state
}

#[tokio::test(start_paused = true)]
async fn test_manual_trigger_runs_full_session() {
    let host = SimulatedHost::new();
    let mut orchestrator = Orchestrator::start(&Config::default(), host.bindings());
    let sender = orchestrator.sender();

    assert!(sender.trigger());
    assert_eq!(state(&orchestrator).await, SessionState::Arming);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(state(&orchestrator).await, SessionState::Listening);
    assert_eq!(host.tones_released().len(), 1);

    sender.engine(
        host.current_generation(),
        EngineEvent::FinalResult(vec!["battery".to_string()]),
    );
    assert_eq!(state(&orchestrator).await, SessionState::Speaking);
    assert_eq!(host.spoken(), vec!["Battery 80 percent".to_string()]);

    let id = host.last_utterance_id().unwrap();
    sender.synth(SynthEvent::UtteranceDone(id));
    assert_eq!(state(&orchestrator).await, SessionState::Idle);

    orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_long_press_through_key_events() {
    let host = SimulatedHost::new();
    let mut orchestrator = Orchestrator::start(&Config::default(), host.bindings());
    let sender = orchestrator.sender();

    assert!(sender.key_event(KeyEvent {
        action: KeyAction::Down,
        repeat_count: 0,
    }));
    tokio::time::sleep(Duration::from_millis(750)).await;
    assert_eq!(state(&orchestrator).await, SessionState::Arming);
    assert_eq!(host.haptic_count(), 1);

    assert!(sender.key_event(KeyEvent {
        action: KeyAction::Up,
        repeat_count: 0,
    }));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!host.wake_lock_held(WakeLockTag::VolumeButton));

    orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_state_changes_are_broadcast() {
    let host = SimulatedHost::new();
    let mut orchestrator = Orchestrator::start(&Config::default(), host.bindings());
    let mut events = orchestrator.subscribe();

    orchestrator.sender().trigger();
    let change = events.recv().await.unwrap();
    assert_eq!(change.previous, SessionState::Idle);
    assert_eq!(change.current, SessionState::Arming);
    assert_eq!(change.reason, TransitionReason::Triggered);

    orchestrator.shutdown().await;
    let closed = events.recv().await.unwrap();
    assert_eq!(closed.current, SessionState::Idle);
    assert_eq!(closed.reason, TransitionReason::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn test_missing_button_passes_keys_through() {
    let host = SimulatedHost::new();
    host.set_capabilities(HostCapabilities {
        volume_button: false,
        accelerometer: true,
    });
    let mut orchestrator = Orchestrator::start(&Config::default(), host.bindings());

    assert_eq!(orchestrator.capabilities(), &[Capability::VolumeButton]);
    assert!(!orchestrator.sender().key_event(KeyEvent {
        action: KeyAction::Down,
        repeat_count: 0,
    }));
    assert!(orchestrator.sender().trigger());
    assert_eq!(state(&orchestrator).await, SessionState::Arming);

    orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_accepting_input() {
    let host = SimulatedHost::new();
    let mut orchestrator = Orchestrator::start(&Config::default(), host.bindings());
    let sender = orchestrator.sender();
    assert!(host.wake_lock_held(WakeLockTag::Shake));

    sender.trigger();
    orchestrator.shutdown().await;
    orchestrator.shutdown().await;

    assert!(!sender.trigger());
    assert!(orchestrator.status().await.is_none());
    assert_eq!(host.focus_abandons(), 1);
    assert_eq!(host.engines_destroyed(), 1);
    assert!(!host.wake_lock_held(WakeLockTag::Shake));
}
