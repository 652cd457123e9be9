//! Single-actor orchestration loop
//!
//! Host callbacks arrive on arbitrary threads (input, sensor, recognizer,
//! synthesizer, telephony). They are marshalled through an [`EventSender`]
//! onto one unbounded queue and applied in arrival order by a single tokio
//! task, which also sleeps until the earliest pending timer of the gesture
//! detector or the session controller.
//!
//! [`OrchestratorCore`] is the synchronous part of that task. It takes the
//! current time as a parameter and can be driven directly in tests.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::audio::FocusChange;
use crate::config::Config;
use crate::error::Capability;
use crate::gesture::{GestureDetector, KeyEvent, MotionSample, Trigger, TriggerSource};
use crate::platform::{ContactDirectory, HostBindings, TelephonyEvent};
use crate::session::{
    SessionCollaborators, SessionStatus, StateChange, VoiceSessionController,
};
use crate::speech::{EngineEvent, SynthEvent};

/// Caller name announced when the number is withheld
const UNKNOWN_CALLER: &str = "Unknown";

/// Everything the orchestration engine reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Key(KeyEvent),
    Motion(MotionSample),
    /// Operator request equivalent to a gesture
    ManualTrigger,
    /// Recognizer callback tagged with the engine generation it came from
    Engine { generation: u64, event: EngineEvent },
    Synth(SynthEvent),
    Focus(FocusChange),
    Telephony(TelephonyEvent),
    Cancel,
}

/// Gesture detector and session controller driven as one unit
pub struct OrchestratorCore {
    gestures: GestureDetector,
    controller: VoiceSessionController,
    contacts: Arc<dyn ContactDirectory>,
    unavailable: Vec<Capability>,
}

impl OrchestratorCore {
    /// Build the gesture detector and session controller for `host`
    pub fn new(config: &Config, host: HostBindings) -> Self {
        let gestures = GestureDetector::new(
            &config.gesture,
            host.capabilities,
            host.volume,
            host.haptics,
            host.wake_lock,
        );

        let mut controller = VoiceSessionController::new(
            config,
            SessionCollaborators {
                focus: host.focus,
                tones: host.tones,
                synthesizer: host.synthesizer,
                speech_engine: host.speech_engine,
                telephony: host.telephony,
                contacts: host.contacts.clone(),
                media: host.media,
                device: host.device,
            },
        );

        let mut unavailable = gestures.unavailable().to_vec();
        if let Err(e) = controller.initialize_engine() {
            tracing::error!("{}", e);
            unavailable.push(Capability::SpeechRecognition);
        }

        Self {
            gestures,
            controller,
            contacts: host.contacts,
            unavailable,
        }
    }

    /// Capabilities found missing at start
    pub fn capabilities(&self) -> &[Capability] {
        &self.unavailable
    }

    /// Whether volume key events are being consumed
    pub fn button_enabled(&self) -> bool {
        !self.unavailable.contains(&Capability::VolumeButton)
    }

    /// Returns the gesture detector
    pub fn gestures(&self) -> &GestureDetector {
        &self.gestures
    }

    /// Returns the session controller
    pub fn controller(&self) -> &VoiceSessionController {
        &self.controller
    }

    /// Returns the controller snapshot
    pub fn status(&self) -> SessionStatus {
        self.controller.status()
    }

    /// Apply one input. Returns whether a key event was consumed; `false` for
    /// every other input.
    pub fn handle(&mut self, event: InputEvent, now: Instant) -> bool {
        // Timers that expired while the event was queued run first
        self.fire_due(now);

        match event {
            InputEvent::Key(key) => return self.gestures.on_key_event(key, now),
            InputEvent::Motion(sample) => {
                if let Some(trigger) = self.gestures.on_motion_sample(sample, now) {
                    self.controller.on_trigger(trigger, now);
                }
            }
            InputEvent::ManualTrigger => {
                self.controller.on_trigger(
                    Trigger {
                        source: TriggerSource::Manual,
                    },
                    now,
                );
            }
            InputEvent::Engine { generation, event } => {
                self.controller.on_engine_event(generation, event, now);
            }
            InputEvent::Synth(event) => self.controller.on_synth_event(event),
            InputEvent::Focus(change) => self.controller.on_focus_changed(change),
            InputEvent::Telephony(TelephonyEvent::Ringing { caller_id }) => {
                let caller = self.resolve_caller(caller_id);
                self.controller.on_incoming_call(caller);
            }
            InputEvent::Cancel => self.controller.cancel(),
        }
        false
    }

    /// Earliest pending timer of either component
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.gestures.next_deadline(), self.controller.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Run every timer due at `now`
    pub fn fire_due(&mut self, now: Instant) {
        while let Some(trigger) = self.gestures.fire_due(now) {
            self.controller.on_trigger(trigger, now);
        }
        self.controller.fire_due(now);
    }

    /// Release wake locks, focus and capture. Idempotent.
    pub fn shutdown(&mut self) {
        self.gestures.shutdown();
        self.controller.shutdown();
    }

    fn resolve_caller(&self, caller_id: Option<String>) -> String {
        let Some(number) = caller_id.filter(|n| !n.trim().is_empty()) else {
            return UNKNOWN_CALLER.to_string();
        };

        match self.contacts.display_name(&number) {
            Ok(Some(name)) => name,
            Ok(None) => number,
            Err(e) => {
                tracing::warn!("Caller lookup failed: {}", e);
                number
            }
        }
    }
}

enum Message {
    Input(InputEvent),
    Status(oneshot::Sender<SessionStatus>),
    Shutdown,
}

/// Cloneable handle for delivering host callbacks from any thread
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Message>,
    button_enabled: bool,
}

impl EventSender {
    /// Queue an input. Returns `false` once the orchestrator has stopped.
    pub fn send(&self, event: InputEvent) -> bool {
        if self.tx.send(Message::Input(event)).is_err() {
            tracing::debug!("Orchestrator stopped, dropping input");
            return false;
        }
        true
    }

    /// Queue a volume key event and tell the host whether to swallow it
    pub fn key_event(&self, event: KeyEvent) -> bool {
        self.send(InputEvent::Key(event)) && self.button_enabled
    }

    pub fn motion_sample(&self, sample: MotionSample) -> bool {
        self.send(InputEvent::Motion(sample))
    }

    /// Open a command session without a gesture
    pub fn trigger(&self) -> bool {
        self.send(InputEvent::ManualTrigger)
    }

    pub fn engine(&self, generation: u64, event: EngineEvent) -> bool {
        self.send(InputEvent::Engine { generation, event })
    }

    pub fn synth(&self, event: SynthEvent) -> bool {
        self.send(InputEvent::Synth(event))
    }

    pub fn focus(&self, change: FocusChange) -> bool {
        self.send(InputEvent::Focus(change))
    }

    /// Report an incoming call
    pub fn ringing(&self, caller_id: Option<String>) -> bool {
        self.send(InputEvent::Telephony(TelephonyEvent::Ringing { caller_id }))
    }

    /// Abort the open session
    pub fn cancel(&self) -> bool {
        self.send(InputEvent::Cancel)
    }
}

/// Running orchestration engine
pub struct Orchestrator {
    sender: EventSender,
    events: broadcast::Sender<StateChange>,
    unavailable: Vec<Capability>,
    task: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Build the engine and spawn its actor task on the current tokio runtime
    pub fn start(config: &Config, host: HostBindings) -> Self {
        let core = OrchestratorCore::new(config, host);
        let (tx, rx) = mpsc::unbounded_channel();

        let sender = EventSender {
            tx,
            button_enabled: core.button_enabled() && config.gesture.volume_button_enabled,
        };
        let events = core.controller().event_sender();
        let unavailable = core.capabilities().to_vec();

        let task = tokio::spawn(run(core, rx));
        tracing::info!("Orchestrator started");

        Self {
            sender,
            events,
            unavailable,
            task: Some(task),
        }
    }

    /// Returns a handle for feeding host events
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    /// Capabilities found missing at start
    pub fn capabilities(&self) -> &[Capability] {
        &self.unavailable
    }

    /// Current controller snapshot, `None` once stopped
    pub async fn status(&self) -> Option<SessionStatus> {
        let (reply, response) = oneshot::channel();
        self.sender.tx.send(Message::Status(reply)).ok()?;
        response.await.ok()
    }

    /// Stop the actor: cancels timers, releases focus and stops capture
    pub async fn shutdown(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        let _ = self.sender.tx.send(Message::Shutdown);
        if let Err(e) = task.await {
            tracing::error!("Orchestrator task failed: {}", e);
        }
        tracing::info!("Orchestrator stopped");
    }
}

async fn run(mut core: OrchestratorCore, mut rx: mpsc::UnboundedReceiver<Message>) {
    loop {
        let deadline = core.next_deadline();
        let timer = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            message = rx.recv() => {
                let now = tokio::time::Instant::now().into_std();
                match message {
                    Some(Message::Input(event)) => {
                        core.handle(event, now);
                    }
                    Some(Message::Status(reply)) => {
                        let _ = reply.send(core.status());
                    }
                    Some(Message::Shutdown) | None => {
                        core.shutdown();
                        break;
                    }
                }
            }
            _ = timer => {
                core.fire_due(tokio::time::Instant::now().into_std());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::KeyAction;
    use crate::platform::simulated::SimulatedHost;
    use crate::platform::{HostCapabilities, WakeLockTag};
    use crate::session::SessionState;
    use std::time::Duration;

    fn core(host: &Arc<SimulatedHost>) -> OrchestratorCore {
        OrchestratorCore::new(&Config::default(), host.bindings())
    }

    #[test]
    fn test_long_press_opens_session() {
        let host = SimulatedHost::new();
        let mut core = core(&host);
        let t0 = Instant::now();

        let down = KeyEvent {
            action: KeyAction::Down,
            repeat_count: 0,
        };
        assert!(core.handle(InputEvent::Key(down), t0));
        assert_eq!(core.next_deadline(), Some(t0 + Duration::from_millis(700)));

        core.fire_due(t0 + Duration::from_millis(700));
        assert_eq!(core.controller().state(), SessionState::Arming);
        assert_eq!(host.haptic_count(), 1);
    }

    #[test]
    fn test_overdue_timer_runs_before_release() {
        let host = SimulatedHost::new();
        let mut core = core(&host);
        let t0 = Instant::now();

        let down = KeyEvent {
            action: KeyAction::Down,
            repeat_count: 0,
        };
        let up = KeyEvent {
            action: KeyAction::Up,
            repeat_count: 0,
        };
        core.handle(InputEvent::Key(down), t0);
        core.handle(InputEvent::Key(up), t0 + Duration::from_millis(750));

        assert_eq!(core.controller().state(), SessionState::Arming);
        assert!(host.volume_changes().iter().all(|(_, show_ui)| !show_ui));
    }

    #[test]
    fn test_shake_opens_session_with_lock_held() {
        let host = SimulatedHost::new();
        let mut core = core(&host);
        let t0 = Instant::now();

        let at_rest = MotionSample {
            x: 0.0,
            y: 0.0,
            z: 9.8,
        };
        core.handle(InputEvent::Motion(at_rest), t0);
        assert!(host.wake_lock_held(WakeLockTag::Shake));
        assert_eq!(core.controller().state(), SessionState::Idle);

        let shake = MotionSample {
            x: 25.0,
            y: 12.0,
            z: 9.8,
        };
        core.handle(InputEvent::Motion(shake), t0 + Duration::from_millis(50));
        assert_eq!(core.controller().state(), SessionState::Arming);
        assert!(host.wake_lock_held(WakeLockTag::Shake));
    }

    #[test]
    fn test_ringing_resolves_caller() {
        let host = SimulatedHost::new();
        host.add_contact("Jane", "5550001111");
        let mut core = core(&host);

        core.handle(
            InputEvent::Telephony(TelephonyEvent::Ringing {
                caller_id: Some("5550001111".to_string()),
            }),
            Instant::now(),
        );
        assert_eq!(host.spoken(), vec!["Call from Jane".to_string()]);
    }

    #[test]
    fn test_ringing_unknown_number_announced_as_number() {
        let host = SimulatedHost::new();
        let mut core = core(&host);

        core.handle(
            InputEvent::Telephony(TelephonyEvent::Ringing {
                caller_id: Some("5559998888".to_string()),
            }),
            Instant::now(),
        );
        assert_eq!(host.spoken(), vec!["Call from 5559998888".to_string()]);
    }

    #[test]
    fn test_withheld_caller() {
        let host = SimulatedHost::new();
        let mut core = core(&host);

        core.handle(
            InputEvent::Telephony(TelephonyEvent::Ringing { caller_id: None }),
            Instant::now(),
        );
        assert_eq!(host.spoken(), vec!["Call from Unknown".to_string()]);
    }

    #[test]
    fn test_missing_capabilities_reported() {
        let host = SimulatedHost::new();
        host.set_capabilities(HostCapabilities {
            volume_button: false,
            accelerometer: true,
        });
        host.set_recognition_available(false);
        let core = core(&host);

        assert_eq!(
            core.capabilities(),
            &[Capability::VolumeButton, Capability::SpeechRecognition]
        );
        assert!(!core.button_enabled());
    }

    #[test]
    fn test_next_deadline_is_earliest() {
        let host = SimulatedHost::new();
        let mut core = core(&host);
        let t0 = Instant::now();

        core.handle(InputEvent::ManualTrigger, t0);
        let down = KeyEvent {
            action: KeyAction::Down,
            repeat_count: 0,
        };
        core.handle(InputEvent::Key(down), t0);

        // Earcon release (150ms) comes before start-listening and long press
        assert_eq!(core.next_deadline(), Some(t0 + Duration::from_millis(150)));
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let host = SimulatedHost::new();
        let mut core = core(&host);
        let t0 = Instant::now();

        core.handle(InputEvent::ManualTrigger, t0);
        let down = KeyEvent {
            action: KeyAction::Down,
            repeat_count: 0,
        };
        core.handle(InputEvent::Key(down), t0);
        assert!(host.wake_lock_held(WakeLockTag::Shake));

        core.shutdown();
        assert!(core.next_deadline().is_none());
        assert!(!host.wake_lock_held(WakeLockTag::VolumeButton));
        assert!(!host.wake_lock_held(WakeLockTag::Shake));
        assert_eq!(host.focus_abandons(), 1);
        assert_eq!(core.controller().state(), SessionState::Idle);
    }
}
