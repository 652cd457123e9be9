//! Voice session controller
//!
//! Owns the single [`VoiceSession`], the audio focus arbiter, both speech
//! adapters and the session timers. Every input (trigger, ringing call, engine
//! callback, utterance callback, timer) enters through one `&mut self` method,
//! so state checks and mutations never interleave.
//!
//! All host failures are turned into transitions here. The user only ever
//! hears a short phrase before the session closes.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::audio::{AudioFocusArbiter, AudioFocusHost, FocusChange};
use crate::config::{Config, RecognitionConfig, SessionConfig};
use crate::error::{AdapterError, Result, VeloxError};
use crate::gesture::Trigger;
use crate::interpreter::{self, CallTarget, Command, SessionMode};
use crate::platform::{
    ContactDirectory, DeviceStatus, MediaKey, MediaKeyDispatcher, TelephonyBridge,
};
use crate::sound::{Tone, TonePlayer};
use crate::speech::{
    EngineErrorKind, EngineEvent, SpeechEngineAdapter, SpeechEngineFactory, SpeechSynthesizer,
    SpeechSynthesizerAdapter, SynthEvent, UtteranceOutcome,
};
use crate::timers::TimerRegistry;

use super::state::{
    SessionState, SessionStatus, SpeechFollowUp, StateChange, TransitionReason, VoiceSession,
};

/// Capacity of the state change broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

const PHRASE_WHO_TO_CALL: &str = "Who should I call?";
const PHRASE_CALL_PERMISSION: &str = "Cannot make calls, permission denied";
const PHRASE_CALL_FAILED: &str = "Call failed";
const PHRASE_ANSWERING: &str = "Answering";
const PHRASE_ANSWER_FAILED: &str = "Could not answer the call";
const PHRASE_REJECTED: &str = "Call rejected";
const PHRASE_REJECT_FAILED: &str = "Could not reject the call";
const PHRASE_BATTERY_UNAVAILABLE: &str = "Battery level unavailable";
const PHRASE_MEDIA_FAILED: &str = "Media control failed";
const PHRASE_UNKNOWN: &str = "Unknown command";
const PHRASE_NO_MATCH: &str = "Sorry, I didn't catch that";
const PHRASE_NETWORK: &str = "Network error";

/// Timers owned by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionTimer {
    /// Earcon done, start capture
    StartListening,
    /// Free the earcon tone generator
    ReleaseEarcon,
    /// Confirmation tone finished, close the session
    ConfirmationTone,
    /// Rebuild the speech engine after a client fault
    ReinitEngine,
}

impl SessionTimer {
    /// Timers that belong to an open session and die with it
    const SESSION_SCOPED: [SessionTimer; 3] = [
        SessionTimer::StartListening,
        SessionTimer::ReleaseEarcon,
        SessionTimer::ConfirmationTone,
    ];
}

/// Host collaborators used by the controller
pub struct SessionCollaborators {
    pub focus: Arc<dyn AudioFocusHost>,
    pub tones: Arc<dyn TonePlayer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub speech_engine: Box<dyn SpeechEngineFactory>,
    pub telephony: Arc<dyn TelephonyBridge>,
    pub contacts: Arc<dyn ContactDirectory>,
    pub media: Arc<dyn MediaKeyDispatcher>,
    pub device: Arc<dyn DeviceStatus>,
}

pub struct VoiceSessionController {
    config: SessionConfig,
    recognition: RecognitionConfig,
    focus: AudioFocusArbiter,
    engine: SpeechEngineAdapter,
    synthesizer: SpeechSynthesizerAdapter,
    tones: Arc<dyn TonePlayer>,
    telephony: Arc<dyn TelephonyBridge>,
    contacts: Arc<dyn ContactDirectory>,
    media: Arc<dyn MediaKeyDispatcher>,
    device: Arc<dyn DeviceStatus>,
    state: SessionState,
    session: Option<VoiceSession>,
    timers: TimerRegistry<SessionTimer>,
    /// Tones started and not yet released
    active_tones: Vec<Tone>,
    events: broadcast::Sender<StateChange>,
    shut_down: bool,
}

impl VoiceSessionController {
    /// Create an idle controller. Call [`initialize_engine`](Self::initialize_engine) before use.
    pub fn new(config: &Config, collaborators: SessionCollaborators) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            config: config.session.clone(),
            recognition: config.recognition.clone(),
            focus: AudioFocusArbiter::new(collaborators.focus),
            engine: SpeechEngineAdapter::new(collaborators.speech_engine),
            synthesizer: SpeechSynthesizerAdapter::new(collaborators.synthesizer),
            tones: collaborators.tones,
            telephony: collaborators.telephony,
            contacts: collaborators.contacts,
            media: collaborators.media,
            device: collaborators.device,
            state: SessionState::Idle,
            session: None,
            timers: TimerRegistry::new(),
            active_tones: Vec::new(),
            events,
            shut_down: false,
        }
    }

    /// Create the speech engine instance
    pub fn initialize_engine(&mut self) -> Result<()> {
        self.engine.initialize()
    }

    /// Returns the current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the open session, if any
    pub fn session(&self) -> Option<&VoiceSession> {
        self.session.as_ref()
    }

    /// Generation of the live speech engine instance
    pub fn engine_generation(&self) -> u64 {
        self.engine.generation()
    }

    /// Whether an engine rebuild is scheduled
    pub fn is_reinit_pending(&self) -> bool {
        self.timers.is_pending(SessionTimer::ReinitEngine)
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    /// Sender half of the state change channel, for subscribing later
    pub fn event_sender(&self) -> broadcast::Sender<StateChange> {
        self.events.clone()
    }

    /// Returns a serializable snapshot of the controller
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            description: self.state.description().to_string(),
            session_id: self.session.as_ref().map(|s| s.id),
            mode: self.session.as_ref().map(|s| s.mode),
            caller_name: self.session.as_ref().and_then(|s| s.caller_name.clone()),
            focus_held: self.focus.is_held(),
            listening: self.engine.is_listening(),
            reinitializing: self.engine.is_reinitializing(),
            reinit_pending: self.is_reinit_pending(),
        }
    }

    /// Earliest pending session timer
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Open a command session. Returns `false` if the trigger was dropped or
    /// the session could not get audio focus.
    pub fn on_trigger(&mut self, trigger: Trigger, now: Instant) -> bool {
        if !self.can_open_session() {
            tracing::warn!("Ignoring {:?} trigger", trigger.source);
            return false;
        }

        tracing::info!("Voice command triggered ({:?})", trigger.source);
        self.open_session(SessionMode::Command, None, TransitionReason::Triggered);

        if !self.ensure_focus() {
            return false;
        }

        if self.play_tone(Tone::Earcon) {
            self.timers
                .arm(SessionTimer::ReleaseEarcon, now, self.config.earcon_release());
        }
        self.timers.arm(
            SessionTimer::StartListening,
            now,
            self.config.earcon_to_listen(),
        );
        true
    }

    /// Open an incoming-call session and announce the caller
    pub fn on_incoming_call(&mut self, caller_name: String) -> bool {
        if !self.can_open_session() {
            tracing::warn!("Ignoring incoming call from {}", caller_name);
            return false;
        }

        tracing::info!("Incoming call from {}", caller_name);
        self.open_session(
            SessionMode::IncomingCall,
            Some(caller_name.clone()),
            TransitionReason::IncomingCall,
        );

        if !self.ensure_focus() {
            return false;
        }

        self.speak(&format!("Call from {}", caller_name), SpeechFollowUp::Listen);
        self.session.is_some()
    }

    /// Apply a callback from the speech engine instance tagged `generation`
    pub fn on_engine_event(&mut self, generation: u64, event: EngineEvent, now: Instant) {
        if !self.engine.is_current(generation) {
            tracing::debug!(
                "Dropping {:?} from stale engine generation {}",
                event,
                generation
            );
            return;
        }

        match event {
            EngineEvent::Ready => {
                tracing::debug!("Ready for speech, microphone open");
            }
            EngineEvent::PartialResult(text) => {
                if self.state != SessionState::Listening || text.trim().is_empty() {
                    return;
                }
                if let Some(session) = self.session.as_mut() {
                    tracing::debug!("Partial result saved: {}", text);
                    session.partial_transcript = Some(text);
                }
            }
            EngineEvent::FinalResult(alternatives) => {
                self.engine.on_capture_finished();
                if self.state != SessionState::Listening {
                    tracing::debug!("Final result outside of listening, ignoring");
                    return;
                }

                match alternatives.into_iter().next() {
                    Some(best) if !best.trim().is_empty() => {
                        tracing::info!("Heard (final): {}", best);
                        self.process_transcript(best, false, now);
                    }
                    _ => {
                        tracing::warn!("No final result from recognizer");
                        match self.take_fallback() {
                            Some(fallback) => {
                                tracing::info!("Using partial result as fallback: {}", fallback);
                                self.process_transcript(fallback, true, now);
                            }
                            None => self.close_session(TransitionReason::NoTranscript),
                        }
                    }
                }
            }
            EngineEvent::Error(kind) => {
                self.engine.on_capture_finished();
                self.on_engine_error(kind, now);
            }
        }
    }

    /// Apply an utterance progress callback
    pub fn on_synth_event(&mut self, event: SynthEvent) {
        let Some(outcome) = self.synthesizer.accept(&event) else {
            return;
        };

        match outcome {
            UtteranceOutcome::Started => tracing::debug!("Speech output started"),
            UtteranceOutcome::Done => {
                if self.state != SessionState::Speaking {
                    return;
                }
                let follow_up = self
                    .session
                    .as_ref()
                    .map(|s| s.follow_up)
                    .unwrap_or_default();
                match follow_up {
                    SpeechFollowUp::Listen => {
                        if let Some(session) = self.session.as_mut() {
                            session.follow_up = SpeechFollowUp::Close;
                        }
                        self.start_listening();
                    }
                    SpeechFollowUp::Close => self.close_session(TransitionReason::Completed),
                }
            }
            UtteranceOutcome::Failed => {
                self.close_session(TransitionReason::SpeechOutputFailed);
            }
        }
    }

    /// Apply a focus change reported by the host
    pub fn on_focus_changed(&mut self, change: FocusChange) {
        self.focus.on_focus_changed(change);
    }

    /// Run every timer due at `now`
    pub fn fire_due(&mut self, now: Instant) {
        while let Some(timer) = self.timers.pop_due(now) {
            tracing::debug!("Session timer {:?} fired", timer);
            match timer {
                SessionTimer::StartListening => {
                    if self.state == SessionState::Arming {
                        self.start_listening();
                    }
                }
                SessionTimer::ReleaseEarcon => self.release_tone(Tone::Earcon),
                SessionTimer::ConfirmationTone => {
                    self.release_tone(Tone::Acknowledge);
                    if self.state == SessionState::Speaking {
                        self.close_session(TransitionReason::Completed);
                    }
                }
                SessionTimer::ReinitEngine => self.recover_engine(),
            }
        }
    }

    /// Force everything back to idle: capture, speech, timers, tones, focus
    pub fn cancel(&mut self) {
        tracing::info!("Cancelling voice session");
        self.close_session(TransitionReason::Cancelled);
        self.force_cleanup();
    }

    /// Tear down for good. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.close_session(TransitionReason::Shutdown);
        self.force_cleanup();
        self.engine.shutdown();
        self.shut_down = true;
        tracing::info!("Voice session controller shut down");
    }

    fn can_open_session(&self) -> bool {
        if self.shut_down {
            return false;
        }
        if let Some(session) = &self.session {
            tracing::warn!(
                "Session {} already active ({:?})",
                session.id,
                self.state
            );
            return false;
        }
        if self.engine.is_reinitializing() || self.engine.is_listening() {
            tracing::warn!("Speech engine busy");
            return false;
        }
        true
    }

    fn open_session(
        &mut self,
        mode: SessionMode,
        caller_name: Option<String>,
        reason: TransitionReason,
    ) {
        // A session opening first cancels any pending rebuild
        if self.timers.cancel(SessionTimer::ReinitEngine) {
            tracing::debug!("Pending engine reinit cancelled by new session");
        }

        let session = VoiceSession::new(mode, caller_name);
        tracing::info!("Voice session {} opened ({:?})", session.id, mode);
        self.session = Some(session);
        self.transition(SessionState::Arming, reason);
    }

    /// Acquire focus before audible output, closing the session if denied
    fn ensure_focus(&mut self) -> bool {
        if self.focus.acquire() {
            return true;
        }
        tracing::warn!("{}", VeloxError::FocusDenied);
        self.close_session(TransitionReason::FocusDenied);
        false
    }

    fn start_listening(&mut self) {
        if !self.ensure_focus() {
            return;
        }

        if let Some(session) = self.session.as_mut() {
            session.partial_transcript = None;
        }

        match self.engine.start_listening(&self.recognition) {
            Ok(()) => self.transition(SessionState::Listening, TransitionReason::ListeningStarted),
            Err(e) => {
                tracing::error!("Could not start listening: {}", e);
                self.close_session(TransitionReason::ListenFailed {
                    message: e.to_string(),
                });
            }
        }
    }

    fn take_fallback(&mut self) -> Option<String> {
        self.session
            .as_mut()
            .and_then(|s| s.partial_transcript.take())
            .filter(|t| !t.trim().is_empty())
    }

    fn on_engine_error(&mut self, kind: EngineErrorKind, now: Instant) {
        tracing::error!("{}", VeloxError::EngineFault(kind));

        if kind == EngineErrorKind::ClientFault {
            self.close_session(TransitionReason::EngineFault { kind });
            self.schedule_reinit(now);
            return;
        }

        if self.state != SessionState::Listening {
            tracing::debug!("Engine error outside of listening, ignoring");
            return;
        }

        if kind.allows_fallback() {
            if let Some(fallback) = self.take_fallback() {
                tracing::info!("Using partial result after {:?}: {}", kind, fallback);
                self.process_transcript(fallback, true, now);
                return;
            }
        }

        match kind {
            EngineErrorKind::NoMatch => self.speak(PHRASE_NO_MATCH, SpeechFollowUp::Close),
            EngineErrorKind::Network | EngineErrorKind::NetworkTimeout => {
                self.speak(PHRASE_NETWORK, SpeechFollowUp::Close)
            }
            _ => self.close_session(TransitionReason::EngineFault { kind }),
        }
    }

    fn schedule_reinit(&mut self, now: Instant) {
        if self.timers.is_pending(SessionTimer::ReinitEngine) {
            tracing::debug!("Engine reinit already scheduled");
            return;
        }
        if self.engine.is_reinitializing() {
            tracing::debug!("Engine already reinitialising");
            return;
        }

        tracing::warn!(
            "Client fault, rebuilding speech engine in {:?}",
            self.config.reinit_cooldown()
        );
        self.timers.arm(
            SessionTimer::ReinitEngine,
            now,
            self.config.reinit_cooldown(),
        );
    }

    fn recover_engine(&mut self) {
        if self.session.is_some() || self.engine.is_listening() {
            tracing::debug!("Session active, skipping engine reinit");
            return;
        }

        self.transition(SessionState::Recovering, TransitionReason::EngineRecovery);
        let success = match self.engine.reinitialize() {
            Ok(done) => done,
            Err(e) => {
                tracing::error!("Speech engine still unavailable after reinit: {}", e);
                false
            }
        };
        self.transition(
            SessionState::Idle,
            TransitionReason::EngineRecovered { success },
        );
    }

    fn process_transcript(&mut self, transcript: String, fallback: bool, now: Instant) {
        let Some(mode) = self.session.as_ref().map(|s| s.mode) else {
            return;
        };

        self.transition(
            SessionState::Interpreting,
            TransitionReason::Transcript { fallback },
        );

        if transcript.trim().is_empty() {
            self.close_session(TransitionReason::NoTranscript);
            return;
        }

        let command = interpreter::interpret(&transcript, mode);
        tracing::info!("Interpreted \"{}\" as {}", transcript, command.description());

        if mode == SessionMode::IncomingCall
            && !matches!(command, Command::AnswerCall | Command::RejectCall)
        {
            tracing::debug!("Unsupported reply to incoming call: {}", transcript);
            self.close_session(TransitionReason::UnsupportedCommand);
            return;
        }

        self.transition(
            SessionState::Dispatching,
            TransitionReason::CommandRecognised {
                command: command.clone(),
            },
        );
        self.dispatch(command, now);
    }

    fn dispatch(&mut self, command: Command, now: Instant) {
        match command {
            Command::PlaceCall(target) => self.dispatch_call(target),
            Command::QueryTime => {
                let time = self.device.local_time().format("%-I:%M %p");
                self.speak(&format!("It is {}", time), SpeechFollowUp::Close);
            }
            Command::QueryBattery => match self.device.battery_percent() {
                Ok(level) => {
                    self.speak(&format!("Battery {} percent", level), SpeechFollowUp::Close)
                }
                Err(e) => {
                    tracing::warn!("Could not read battery level: {}", e);
                    self.speak(PHRASE_BATTERY_UNAVAILABLE, SpeechFollowUp::Close);
                }
            },
            Command::MediaNext => self.dispatch_media(MediaKey::Next, now),
            Command::MediaPlay => self.dispatch_media(MediaKey::Play, now),
            Command::MediaPause => self.dispatch_media(MediaKey::Pause, now),
            Command::AnswerCall => match self.telephony.answer_call() {
                Ok(()) => self.speak(PHRASE_ANSWERING, SpeechFollowUp::Close),
                Err(e) => {
                    self.report_action_failure("Answer call", &e);
                    self.speak(PHRASE_ANSWER_FAILED, SpeechFollowUp::Close);
                }
            },
            Command::RejectCall => match self.telephony.reject_call() {
                Ok(()) => self.speak(PHRASE_REJECTED, SpeechFollowUp::Close),
                Err(e) => {
                    self.report_action_failure("Reject call", &e);
                    self.speak(PHRASE_REJECT_FAILED, SpeechFollowUp::Close);
                }
            },
            Command::Unknown => self.speak(PHRASE_UNKNOWN, SpeechFollowUp::Close),
        }
    }

    fn dispatch_call(&mut self, target: CallTarget) {
        match target {
            CallTarget::Unspecified => self.speak(PHRASE_WHO_TO_CALL, SpeechFollowUp::Close),
            CallTarget::Number(number) => self.place_call(&number, &number),
            CallTarget::Contact(name) => match self.contacts.lookup_number(&name) {
                Ok(Some(number)) => {
                    tracing::debug!("Found contact {} with number {}", name, number);
                    self.place_call(&number, &name);
                }
                Ok(None) => {
                    self.speak(&format!("Contact {} not found", name), SpeechFollowUp::Close)
                }
                Err(e) => {
                    tracing::error!("Error searching contacts: {}", e);
                    self.speak(&format!("Contact {} not found", name), SpeechFollowUp::Close);
                }
            },
        }
    }

    fn place_call(&mut self, number: &str, display_name: &str) {
        match self.telephony.place_call(number) {
            Ok(()) => {
                tracing::info!("Initiated call to {}", number);
                self.speak(&format!("Calling {}", display_name), SpeechFollowUp::Close);
            }
            Err(e @ AdapterError::PermissionDenied(_)) => {
                self.report_action_failure("Place call", &e);
                self.speak(PHRASE_CALL_PERMISSION, SpeechFollowUp::Close);
            }
            Err(e) => {
                self.report_action_failure("Place call", &e);
                self.speak(PHRASE_CALL_FAILED, SpeechFollowUp::Close);
            }
        }
    }

    fn dispatch_media(&mut self, key: MediaKey, now: Instant) {
        if let Err(e) = self.media.dispatch_media_key(key) {
            self.report_action_failure("Media key", &e);
            self.speak(PHRASE_MEDIA_FAILED, SpeechFollowUp::Close);
            return;
        }

        tracing::debug!("Media key dispatched: {:?}", key);
        self.confirm_with_tone(now);
    }

    fn confirm_with_tone(&mut self, now: Instant) {
        if !self.ensure_focus() {
            return;
        }

        self.transition(SessionState::Speaking, TransitionReason::ToneQueued);
        if self.play_tone(Tone::Acknowledge) {
            self.timers.arm(
                SessionTimer::ConfirmationTone,
                now,
                self.config.confirmation_tone(),
            );
        } else {
            self.close_session(TransitionReason::Completed);
        }
    }

    fn report_action_failure(&self, action: &str, error: &AdapterError) {
        let err = VeloxError::ActionFailed {
            action: action.to_string(),
            reason: error.to_string(),
        };
        tracing::error!("{}", err);
    }

    /// Speak `text`, then follow up. Closes the session if nothing can be said.
    fn speak(&mut self, text: &str, follow_up: SpeechFollowUp) {
        if self.session.is_none() {
            return;
        }
        if !self.ensure_focus() {
            return;
        }

        match self.synthesizer.speak(text) {
            Ok(_) => {
                if let Some(session) = self.session.as_mut() {
                    session.follow_up = follow_up;
                }
                self.transition(SessionState::Speaking, TransitionReason::SpeechQueued);
            }
            Err(e) => {
                tracing::error!("Speech output unavailable: {}", e);
                self.close_session(TransitionReason::SpeechOutputFailed);
            }
        }
    }

    fn play_tone(&mut self, tone: Tone) -> bool {
        if !self.config.play_tones {
            return false;
        }

        match self
            .tones
            .play_tone(tone, self.config.tone_volume, self.config.tone_duration())
        {
            Ok(()) => {
                if !self.active_tones.contains(&tone) {
                    self.active_tones.push(tone);
                }
                true
            }
            Err(e) => {
                tracing::warn!("Tone playback error: {}", e);
                false
            }
        }
    }

    fn release_tone(&mut self, tone: Tone) {
        if let Some(index) = self.active_tones.iter().position(|t| *t == tone) {
            self.active_tones.remove(index);
            self.tones.release_tone(tone);
        }
    }

    fn release_all_tones(&mut self) {
        for tone in std::mem::take(&mut self.active_tones) {
            self.tones.release_tone(tone);
        }
    }

    /// Close the open session on any exit path. No-op without a session.
    fn close_session(&mut self, reason: TransitionReason) {
        let Some(session) = self.session.take() else {
            return;
        };

        self.engine.stop_listening();
        self.synthesizer.stop();
        for timer in SessionTimer::SESSION_SCOPED {
            self.timers.cancel(timer);
        }
        self.release_all_tones();
        self.focus.release();

        let previous = self.state;
        self.state = SessionState::Idle;
        tracing::info!(
            "Voice session {} closed ({:?} -> Idle, {:?})",
            session.id,
            previous,
            reason
        );
        self.publish(StateChange {
            previous,
            current: SessionState::Idle,
            reason,
            session_id: Some(session.id),
        });
    }

    fn force_cleanup(&mut self) {
        let cancelled = self.timers.cancel_all();
        if cancelled > 0 {
            tracing::debug!("Cancelled {} pending timers", cancelled);
        }
        self.engine.stop_listening();
        self.synthesizer.stop();
        self.release_all_tones();
        self.focus.release();
    }

    fn transition(&mut self, next: SessionState, reason: TransitionReason) {
        let previous = self.state;
        if !previous.can_transition_to(next) {
            tracing::warn!("Refusing transition {:?} -> {:?}", previous, next);
            return;
        }

        self.state = next;
        let session_id = self.session.as_mut().map(|session| {
            session.state = next;
            session.id
        });

        tracing::info!("Session state: {:?} -> {:?} ({:?})", previous, next, reason);
        self.publish(StateChange {
            previous,
            current: next,
            reason,
            session_id,
        });
    }

    fn publish(&self, change: StateChange) {
        // No subscribers is fine
        let _ = self.events.send(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::TriggerSource;
    use crate::platform::simulated::SimulatedHost;
    use std::time::Duration;

    const MANUAL: Trigger = Trigger {
        source: TriggerSource::Manual,
    };

    fn controller(host: &Arc<SimulatedHost>) -> VoiceSessionController {
        let mut controller =
            VoiceSessionController::new(&Config::default(), host.session_collaborators());
        controller.initialize_engine().unwrap();
        controller
    }

    /// Trigger and run the earcon delay so the engine is capturing
    fn listening(controller: &mut VoiceSessionController, t0: Instant) {
        assert!(controller.on_trigger(MANUAL, t0));
        controller.fire_due(t0 + Duration::from_millis(300));
        assert_eq!(controller.state(), SessionState::Listening);
    }

    fn finish_speech(host: &SimulatedHost, controller: &mut VoiceSessionController) {
        let id = host.last_utterance_id().unwrap();
        controller.on_synth_event(SynthEvent::UtteranceDone(id));
    }

    #[test]
    fn test_trigger_arms_session() {
        let host = SimulatedHost::new();
        let mut controller = controller(&host);
        let t0 = Instant::now();

        assert!(controller.on_trigger(MANUAL, t0));
        assert_eq!(controller.state(), SessionState::Arming);
        assert!(controller.status().focus_held);
        assert_eq!(host.tones_played(), vec![Tone::Earcon]);

        controller.fire_due(t0 + Duration::from_millis(150));
        assert_eq!(host.tones_released(), vec![Tone::Earcon]);
        assert_eq!(controller.state(), SessionState::Arming);

        controller.fire_due(t0 + Duration::from_millis(300));
        assert_eq!(controller.state(), SessionState::Listening);
        let starts = host.engine_starts();
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[0].min_speech_ms, 3000);
        assert_eq!(starts[0].complete_silence_ms, 1500);
    }

    #[test]
    fn test_second_trigger_is_dropped() {
        let host = SimulatedHost::new();
        let mut controller = controller(&host);
        let t0 = Instant::now();

        assert!(controller.on_trigger(MANUAL, t0));
        let id = controller.session().unwrap().id;
        assert!(!controller.on_trigger(MANUAL, t0));
        assert!(!controller.on_incoming_call("Jane".to_string()));
        assert_eq!(controller.session().unwrap().id, id);
        assert_eq!(host.focus_requests(), 1);
    }

    #[test]
    fn test_focus_denied_closes_before_output() {
        let host = SimulatedHost::new();
        host.set_focus_granted(false);
        let mut controller = controller(&host);
        let mut events = controller.subscribe();

        assert!(!controller.on_trigger(MANUAL, Instant::now()));
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(controller.session().is_none());
        assert!(host.tones_played().is_empty());
        assert_eq!(host.focus_abandons(), 0);

        let opened = events.try_recv().unwrap();
        assert_eq!(opened.current, SessionState::Arming);
        let closed = events.try_recv().unwrap();
        assert_eq!(closed.reason, TransitionReason::FocusDenied);
    }

    #[test]
    fn test_partial_result_used_when_final_is_empty() {
        let host = SimulatedHost::new();
        host.add_contact("Mom", "5550001111");
        let mut controller = controller(&host);
        let generation = controller.engine_generation();
        listening(&mut controller, Instant::now());

        controller.on_engine_event(
            generation,
            EngineEvent::PartialResult("call mom".to_string()),
            Instant::now(),
        );
        controller.on_engine_event(
            generation,
            EngineEvent::PartialResult(String::new()),
            Instant::now(),
        );
        controller.on_engine_event(generation, EngineEvent::FinalResult(vec![]), Instant::now());

        assert_eq!(host.placed_calls(), vec!["5550001111".to_string()]);
        assert_eq!(host.spoken().last().map(String::as_str), Some("Calling mom"));
    }

    #[test]
    fn test_empty_final_without_fallback_closes() {
        let host = SimulatedHost::new();
        let mut controller = controller(&host);
        let generation = controller.engine_generation();
        listening(&mut controller, Instant::now());

        controller.on_engine_event(generation, EngineEvent::FinalResult(vec![]), Instant::now());
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(host.spoken().is_empty());
        assert_eq!(host.focus_abandons(), 1);
    }

    #[test]
    fn test_no_match_speaks_and_closes() {
        let host = SimulatedHost::new();
        let mut controller = controller(&host);
        let generation = controller.engine_generation();
        listening(&mut controller, Instant::now());

        controller.on_engine_event(
            generation,
            EngineEvent::Error(EngineErrorKind::NoMatch),
            Instant::now(),
        );
        assert_eq!(controller.state(), SessionState::Speaking);
        assert_eq!(host.spoken(), vec![PHRASE_NO_MATCH.to_string()]);

        finish_speech(&host, &mut controller);
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(host.focus_abandons(), 1);
    }

    #[test]
    fn test_network_error_uses_fallback() {
        let host = SimulatedHost::new();
        host.set_battery(64);
        let mut controller = controller(&host);
        let generation = controller.engine_generation();
        listening(&mut controller, Instant::now());

        controller.on_engine_event(
            generation,
            EngineEvent::PartialResult("battery".to_string()),
            Instant::now(),
        );
        controller.on_engine_event(
            generation,
            EngineEvent::Error(EngineErrorKind::NetworkTimeout),
            Instant::now(),
        );
        assert_eq!(host.spoken(), vec!["Battery 64 percent".to_string()]);
    }

    #[test]
    fn test_other_errors_close_silently() {
        let host = SimulatedHost::new();
        let mut controller = controller(&host);
        let generation = controller.engine_generation();
        listening(&mut controller, Instant::now());

        controller.on_engine_event(
            generation,
            EngineEvent::Error(EngineErrorKind::Audio),
            Instant::now(),
        );
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(host.spoken().is_empty());
        assert!(!controller.is_reinit_pending());
    }

    #[test]
    fn test_stale_generation_is_dropped() {
        let host = SimulatedHost::new();
        let mut controller = controller(&host);
        let generation = controller.engine_generation();
        listening(&mut controller, Instant::now());

        controller.on_engine_event(
            generation + 7,
            EngineEvent::FinalResult(vec!["what time is it".to_string()]),
            Instant::now(),
        );
        assert_eq!(controller.state(), SessionState::Listening);
    }

    #[test]
    fn test_media_command_confirms_with_tone() {
        let host = SimulatedHost::new();
        let mut controller = controller(&host);
        let generation = controller.engine_generation();
        let t0 = Instant::now();
        listening(&mut controller, t0);

        controller.on_engine_event(
            generation,
            EngineEvent::FinalResult(vec!["next song".to_string()]),
            t0,
        );
        assert_eq!(host.media_keys(), vec![MediaKey::Next]);
        assert_eq!(controller.state(), SessionState::Speaking);
        assert!(host.tones_played().contains(&Tone::Acknowledge));
        assert!(host.spoken().is_empty());

        controller.fire_due(Instant::now() + Duration::from_millis(200));
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(host.tones_released().contains(&Tone::Acknowledge));
    }

    #[test]
    fn test_call_permission_denied_is_spoken() {
        let host = SimulatedHost::new();
        host.fail_place_call(AdapterError::PermissionDenied("CALL_PHONE".to_string()));
        let mut controller = controller(&host);
        let generation = controller.engine_generation();
        listening(&mut controller, Instant::now());

        controller.on_engine_event(
            generation,
            EngineEvent::FinalResult(vec!["call 5551234567".to_string()]),
            Instant::now(),
        );
        assert_eq!(host.spoken(), vec![PHRASE_CALL_PERMISSION.to_string()]);
    }

    #[test]
    fn test_unknown_contact() {
        let host = SimulatedHost::new();
        let mut controller = controller(&host);
        let generation = controller.engine_generation();
        listening(&mut controller, Instant::now());

        controller.on_engine_event(
            generation,
            EngineEvent::FinalResult(vec!["call bob".to_string()]),
            Instant::now(),
        );
        assert_eq!(host.spoken(), vec!["Contact bob not found".to_string()]);
        assert!(host.placed_calls().is_empty());
    }

    #[test]
    fn test_synthesizer_not_ready_closes_session() {
        let host = SimulatedHost::new();
        host.set_synthesizer_ready(false);
        let mut controller = controller(&host);

        assert!(!controller.on_incoming_call("Jane".to_string()));
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(host.focus_abandons(), 1);
    }

    #[test]
    fn test_incoming_call_rejects_other_commands() {
        let host = SimulatedHost::new();
        let mut controller = controller(&host);
        let generation = controller.engine_generation();

        controller.on_incoming_call("Jane".to_string());
        finish_speech(&host, &mut controller);
        assert_eq!(controller.state(), SessionState::Listening);

        controller.on_engine_event(
            generation,
            EngineEvent::FinalResult(vec!["play music".to_string()]),
            Instant::now(),
        );
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(host.media_keys().is_empty());
        assert_eq!(host.spoken(), vec!["Call from Jane".to_string()]);
    }

    #[test]
    fn test_answer_failure_is_spoken() {
        let host = SimulatedHost::new();
        host.fail_answer(AdapterError::Failed("telecom".to_string()));
        let mut controller = controller(&host);
        let generation = controller.engine_generation();

        controller.on_incoming_call("Jane".to_string());
        finish_speech(&host, &mut controller);
        controller.on_engine_event(
            generation,
            EngineEvent::FinalResult(vec!["answer".to_string()]),
            Instant::now(),
        );

        assert_eq!(host.answered_calls(), 0);
        assert_eq!(
            host.spoken(),
            vec!["Call from Jane".to_string(), PHRASE_ANSWER_FAILED.to_string()]
        );

        finish_speech(&host, &mut controller);
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(controller.session().is_none());
        assert_eq!(host.focus_abandons(), 1);
    }

    #[test]
    fn test_reject_failure_is_spoken() {
        let host = SimulatedHost::new();
        host.fail_reject(AdapterError::PermissionDenied("ANSWER_PHONE_CALLS".to_string()));
        let mut controller = controller(&host);
        let generation = controller.engine_generation();

        controller.on_incoming_call("Jane".to_string());
        finish_speech(&host, &mut controller);
        controller.on_engine_event(
            generation,
            EngineEvent::FinalResult(vec!["reject".to_string()]),
            Instant::now(),
        );

        assert_eq!(host.rejected_calls(), 0);
        assert_eq!(
            host.spoken().last().map(String::as_str),
            Some(PHRASE_REJECT_FAILED)
        );

        finish_speech(&host, &mut controller);
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(host.focus_abandons(), 1);
    }

    #[test]
    fn test_listen_failure_closes_session() {
        let host = SimulatedHost::new();
        host.fail_engine_start(AdapterError::Failed("microphone busy".to_string()));
        let mut controller = controller(&host);
        let mut events = controller.subscribe();
        let t0 = Instant::now();

        assert!(controller.on_trigger(MANUAL, t0));
        controller.fire_due(t0 + Duration::from_millis(300));

        assert_eq!(controller.state(), SessionState::Idle);
        assert!(controller.session().is_none());
        assert!(!controller.status().listening);
        assert!(host.spoken().is_empty());
        assert_eq!(host.focus_abandons(), 1);

        let mut reasons = Vec::new();
        while let Ok(change) = events.try_recv() {
            reasons.push(change.reason);
        }
        assert!(matches!(
            reasons.last(),
            Some(TransitionReason::ListenFailed { .. })
        ));
    }

    #[test]
    fn test_battery_unavailable_is_spoken() {
        let host = SimulatedHost::new();
        host.fail_battery(AdapterError::Unavailable("battery".to_string()));
        let mut controller = controller(&host);
        let generation = controller.engine_generation();
        listening(&mut controller, Instant::now());

        controller.on_engine_event(
            generation,
            EngineEvent::FinalResult(vec!["battery".to_string()]),
            Instant::now(),
        );
        assert_eq!(host.spoken(), vec![PHRASE_BATTERY_UNAVAILABLE.to_string()]);

        finish_speech(&host, &mut controller);
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(host.focus_abandons(), 1);
    }

    #[test]
    fn test_failed_reinit_leaves_controller_inert() {
        let host = SimulatedHost::new();
        let mut controller = controller(&host);
        let mut events = controller.subscribe();
        let t0 = Instant::now();
        let generation = controller.engine_generation();

        controller.on_engine_event(
            generation,
            EngineEvent::Error(EngineErrorKind::ClientFault),
            t0,
        );
        host.set_recognition_available(false);
        controller.fire_due(t0 + Duration::from_millis(2000));

        let recovered: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|change| change.reason)
            .collect();
        assert_eq!(
            recovered.last(),
            Some(&TransitionReason::EngineRecovered { success: false })
        );
        assert_eq!(controller.state(), SessionState::Idle);

        // The lazy creation attempt at listen time fails as well
        let t1 = t0 + Duration::from_secs(5);
        assert!(controller.on_trigger(MANUAL, t1));
        controller.fire_due(t1 + Duration::from_millis(300));

        let change = std::iter::from_fn(|| events.try_recv().ok())
            .last()
            .unwrap();
        match change.reason {
            TransitionReason::ListenFailed { message } => {
                assert!(message.contains("speech recognition"), "{}", message)
            }
            other => panic!("unexpected reason {:?}", other),
        }
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(controller.session().is_none());
        assert!(host.spoken().is_empty());
        assert_eq!(host.focus_abandons(), 1);
        assert_eq!(host.engines_created(), 1);
        assert!(controller.next_deadline().is_none());
    }

    #[test]
    fn test_cancel_cleans_up_everything() {
        let host = SimulatedHost::new();
        let mut controller = controller(&host);
        listening(&mut controller, Instant::now());

        controller.cancel();
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(host.engine_stops(), 1);
        assert_eq!(host.focus_abandons(), 1);
        assert!(controller.next_deadline().is_none());

        controller.cancel();
        assert_eq!(host.engine_stops(), 1);
        assert_eq!(host.focus_abandons(), 1);
    }

    #[test]
    fn test_cancel_while_arming_releases_earcon() {
        let host = SimulatedHost::new();
        let mut controller = controller(&host);

        controller.on_trigger(MANUAL, Instant::now());
        controller.cancel();
        assert_eq!(host.tones_released(), vec![Tone::Earcon]);
        assert_eq!(host.engine_starts().len(), 0);
    }

    #[test]
    fn test_focus_lost_is_reacquired_before_speaking() {
        let host = SimulatedHost::new();
        let mut controller = controller(&host);
        let generation = controller.engine_generation();
        listening(&mut controller, Instant::now());

        controller.on_focus_changed(FocusChange::Lost);
        assert!(!controller.status().focus_held);

        controller.on_engine_event(
            generation,
            EngineEvent::FinalResult(vec!["what time is it".to_string()]),
            Instant::now(),
        );
        assert_eq!(host.focus_requests(), 2);
        assert!(controller.status().focus_held);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let host = SimulatedHost::new();
        let mut controller = controller(&host);
        listening(&mut controller, Instant::now());

        controller.shutdown();
        controller.shutdown();
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(host.focus_abandons(), 1);
        assert_eq!(host.engines_destroyed(), 1);
        assert!(!controller.on_trigger(MANUAL, Instant::now()));
    }
}
