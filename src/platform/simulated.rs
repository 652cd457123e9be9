//! In-memory host for tests and host-less dry runs
//!
//! [`SimulatedHost`] implements every collaborator trait, records each call
//! and lets the caller inject failures. Platform-side behaviour (the OS
//! stepping the volume, a focus request being denied) is driven through the
//! inspector methods.

use chrono::NaiveTime;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::AudioFocusHost;
use crate::config::RecognitionConfig;
use crate::error::AdapterError;
use crate::session::SessionCollaborators;
use crate::sound::{Tone, TonePlayer};
use crate::speech::{SpeechEngine, SpeechEngineFactory, SpeechSynthesizer};

use super::{
    ContactDirectory, DeviceStatus, Haptics, HostBindings, HostCapabilities, MediaKey,
    MediaKeyDispatcher, TelephonyBridge, VolumeControl, WakeLock, WakeLockTag,
};

#[derive(Debug)]
struct SimState {
    capabilities: HostCapabilities,
    volume: u32,
    volume_changes: Vec<(u32, bool)>,
    haptic_pulses: Vec<Duration>,
    wake_locks_held: Vec<WakeLockTag>,
    wake_lock_acquisitions: Vec<WakeLockTag>,
    focus_granted: bool,
    focus_requests: usize,
    focus_abandons: usize,
    tones_played: Vec<Tone>,
    tones_released: Vec<Tone>,
    synthesizer_ready: bool,
    spoken: Vec<(String, String)>,
    speech_stops: usize,
    recognition_available: bool,
    engine_start_error: Option<AdapterError>,
    engines_created: usize,
    last_generation: u64,
    engines_destroyed: usize,
    engine_starts: Vec<RecognitionConfig>,
    engine_stops: usize,
    placed_calls: Vec<String>,
    place_call_error: Option<AdapterError>,
    answered: usize,
    rejected: usize,
    answer_error: Option<AdapterError>,
    reject_error: Option<AdapterError>,
    /// Contact name -> number
    contacts: Vec<(String, String)>,
    media_keys: Vec<MediaKey>,
    battery: Result<u8, AdapterError>,
    local_time: NaiveTime,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            capabilities: HostCapabilities::default(),
            volume: 5,
            volume_changes: Vec::new(),
            haptic_pulses: Vec::new(),
            wake_locks_held: Vec::new(),
            wake_lock_acquisitions: Vec::new(),
            focus_granted: true,
            focus_requests: 0,
            focus_abandons: 0,
            tones_played: Vec::new(),
            tones_released: Vec::new(),
            synthesizer_ready: true,
            spoken: Vec::new(),
            speech_stops: 0,
            recognition_available: true,
            engine_start_error: None,
            engines_created: 0,
            last_generation: 0,
            engines_destroyed: 0,
            engine_starts: Vec::new(),
            engine_stops: 0,
            placed_calls: Vec::new(),
            place_call_error: None,
            answered: 0,
            rejected: 0,
            answer_error: None,
            reject_error: None,
            contacts: Vec::new(),
            media_keys: Vec::new(),
            battery: Ok(80),
            local_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default(),
        }
    }
}

/// Recording host implementing every collaborator trait
#[derive(Debug, Default)]
pub struct SimulatedHost {
    state: Mutex<SimState>,
}

impl SimulatedHost {
    /// Host with every capability present and nothing recorded
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bindings handing this host to the orchestrator
    pub fn bindings(self: &Arc<Self>) -> HostBindings {
        HostBindings {
            capabilities: self.state.lock().capabilities,
            volume: self.clone(),
            haptics: self.clone(),
            wake_lock: self.clone(),
            focus: self.clone(),
            tones: self.clone(),
            synthesizer: self.clone(),
            speech_engine: self.engine_factory(),
            telephony: self.clone(),
            contacts: self.clone(),
            media: self.clone(),
            device: self.clone(),
        }
    }

    /// Collaborators for a standalone session controller
    pub fn session_collaborators(self: &Arc<Self>) -> SessionCollaborators {
        SessionCollaborators {
            focus: self.clone(),
            tones: self.clone(),
            synthesizer: self.clone(),
            speech_engine: self.engine_factory(),
            telephony: self.clone(),
            contacts: self.clone(),
            media: self.clone(),
            device: self.clone(),
        }
    }

    /// Engine factory recording into this host
    pub fn engine_factory(self: &Arc<Self>) -> Box<dyn SpeechEngineFactory> {
        Box::new(SimulatedEngineFactory { host: self.clone() })
    }

    pub fn set_capabilities(&self, capabilities: HostCapabilities) {
        self.state.lock().capabilities = capabilities;
    }

    // Volume

    pub fn volume_level(&self) -> u32 {
        self.state.lock().volume
    }

    /// Move the volume the way the OS would, without recording a change
    pub fn set_platform_volume(&self, level: u32) {
        self.state.lock().volume = level;
    }

    /// Volume changes made through [`VolumeControl`], with the show-UI flag
    pub fn volume_changes(&self) -> Vec<(u32, bool)> {
        self.state.lock().volume_changes.clone()
    }

    pub fn haptic_count(&self) -> usize {
        self.state.lock().haptic_pulses.len()
    }

    /// Returns whether the lock for `tag` is currently held
    pub fn wake_lock_held(&self, tag: WakeLockTag) -> bool {
        self.state.lock().wake_locks_held.contains(&tag)
    }

    /// Number of times the lock for `tag` was acquired
    pub fn wake_lock_acquisitions(&self, tag: WakeLockTag) -> usize {
        self.state
            .lock()
            .wake_lock_acquisitions
            .iter()
            .filter(|held| **held == tag)
            .count()
    }

    // Focus

    pub fn set_focus_granted(&self, granted: bool) {
        self.state.lock().focus_granted = granted;
    }

    pub fn focus_requests(&self) -> usize {
        self.state.lock().focus_requests
    }

    pub fn focus_abandons(&self) -> usize {
        self.state.lock().focus_abandons
    }

    // Tones and speech output

    pub fn tones_played(&self) -> Vec<Tone> {
        self.state.lock().tones_played.clone()
    }

    pub fn tones_released(&self) -> Vec<Tone> {
        self.state.lock().tones_released.clone()
    }

    pub fn set_synthesizer_ready(&self, ready: bool) {
        self.state.lock().synthesizer_ready = ready;
    }

    /// Texts passed to the synthesizer, oldest first
    pub fn spoken(&self) -> Vec<String> {
        self.state
            .lock()
            .spoken
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }

    pub fn last_utterance_id(&self) -> Option<String> {
        self.state.lock().spoken.last().map(|(_, id)| id.clone())
    }

    pub fn speech_stops(&self) -> usize {
        self.state.lock().speech_stops
    }

    // Speech recognition

    pub fn set_recognition_available(&self, available: bool) {
        self.state.lock().recognition_available = available;
    }

    /// Make every following `start` fail with `error`
    pub fn fail_engine_start(&self, error: AdapterError) {
        self.state.lock().engine_start_error = Some(error);
    }

    /// Configurations passed to successful engine starts
    pub fn engine_starts(&self) -> Vec<RecognitionConfig> {
        self.state.lock().engine_starts.clone()
    }

    pub fn engine_stops(&self) -> usize {
        self.state.lock().engine_stops
    }

    pub fn engines_created(&self) -> usize {
        self.state.lock().engines_created
    }

    pub fn engines_destroyed(&self) -> usize {
        self.state.lock().engines_destroyed
    }

    /// Generation of the most recently created engine instance
    pub fn current_generation(&self) -> u64 {
        self.state.lock().last_generation
    }

    // Telephony and contacts

    pub fn placed_calls(&self) -> Vec<String> {
        self.state.lock().placed_calls.clone()
    }

    pub fn fail_place_call(&self, error: AdapterError) {
        self.state.lock().place_call_error = Some(error);
    }

    pub fn answered_calls(&self) -> usize {
        self.state.lock().answered
    }

    pub fn rejected_calls(&self) -> usize {
        self.state.lock().rejected
    }

    /// Make every following answer fail with `error`
    pub fn fail_answer(&self, error: AdapterError) {
        self.state.lock().answer_error = Some(error);
    }

    /// Make every following reject fail with `error`
    pub fn fail_reject(&self, error: AdapterError) {
        self.state.lock().reject_error = Some(error);
    }

    pub fn add_contact(&self, name: &str, number: &str) {
        self.state
            .lock()
            .contacts
            .push((name.to_string(), number.to_string()));
    }

    // Media and device

    pub fn media_keys(&self) -> Vec<MediaKey> {
        self.state.lock().media_keys.clone()
    }

    pub fn set_battery(&self, percent: u8) {
        self.state.lock().battery = Ok(percent);
    }

    /// Make battery queries fail with `error`
    pub fn fail_battery(&self, error: AdapterError) {
        self.state.lock().battery = Err(error);
    }

    pub fn set_local_time(&self, time: NaiveTime) {
        self.state.lock().local_time = time;
    }
}

impl VolumeControl for SimulatedHost {
    fn current_volume(&self) -> Result<u32, AdapterError> {
        Ok(self.state.lock().volume)
    }

    fn set_volume(&self, level: u32, show_ui: bool) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.volume = level;
        state.volume_changes.push((level, show_ui));
        Ok(())
    }
}

impl Haptics for SimulatedHost {
    fn pulse(&self, duration: Duration) -> Result<(), AdapterError> {
        self.state.lock().haptic_pulses.push(duration);
        Ok(())
    }
}

impl WakeLock for SimulatedHost {
    fn acquire_wake_lock(&self, tag: WakeLockTag, _timeout: Duration) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if !state.wake_locks_held.contains(&tag) {
            state.wake_locks_held.push(tag);
        }
        state.wake_lock_acquisitions.push(tag);
        Ok(())
    }

    fn release_wake_lock(&self, tag: WakeLockTag) {
        self.state.lock().wake_locks_held.retain(|held| *held != tag);
    }
}

impl AudioFocusHost for SimulatedHost {
    fn request_focus(&self) -> Result<bool, AdapterError> {
        let mut state = self.state.lock();
        state.focus_requests += 1;
        Ok(state.focus_granted)
    }

    fn abandon_focus(&self) -> Result<(), AdapterError> {
        self.state.lock().focus_abandons += 1;
        Ok(())
    }
}

impl TonePlayer for SimulatedHost {
    fn play_tone(&self, tone: Tone, _volume: u8, _duration: Duration) -> Result<(), AdapterError> {
        self.state.lock().tones_played.push(tone);
        Ok(())
    }

    fn release_tone(&self, tone: Tone) {
        self.state.lock().tones_released.push(tone);
    }
}

impl SpeechSynthesizer for SimulatedHost {
    fn is_ready(&self) -> bool {
        self.state.lock().synthesizer_ready
    }

    fn speak(&self, text: &str, utterance_id: &str) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if !state.synthesizer_ready {
            return Err(AdapterError::Unavailable("synthesizer".to_string()));
        }
        state
            .spoken
            .push((text.to_string(), utterance_id.to_string()));
        Ok(())
    }

    fn stop_speaking(&self) {
        self.state.lock().speech_stops += 1;
    }
}

impl TelephonyBridge for SimulatedHost {
    fn answer_call(&self) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if let Some(err) = state.answer_error.clone() {
            return Err(err);
        }
        state.answered += 1;
        Ok(())
    }

    fn reject_call(&self) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if let Some(err) = state.reject_error.clone() {
            return Err(err);
        }
        state.rejected += 1;
        Ok(())
    }

    fn place_call(&self, number: &str) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if let Some(err) = state.place_call_error.clone() {
            return Err(err);
        }
        state.placed_calls.push(number.to_string());
        Ok(())
    }
}

impl ContactDirectory for SimulatedHost {
    fn lookup_number(&self, name_query: &str) -> Result<Option<String>, AdapterError> {
        let query = name_query.to_lowercase();
        Ok(self
            .state
            .lock()
            .contacts
            .iter()
            .find(|(name, _)| name.to_lowercase().contains(&query))
            .map(|(_, number)| number.clone()))
    }

    fn display_name(&self, number: &str) -> Result<Option<String>, AdapterError> {
        Ok(self
            .state
            .lock()
            .contacts
            .iter()
            .find(|(_, contact_number)| contact_number == number)
            .map(|(name, _)| name.clone()))
    }
}

impl MediaKeyDispatcher for SimulatedHost {
    fn dispatch_media_key(&self, key: MediaKey) -> Result<(), AdapterError> {
        self.state.lock().media_keys.push(key);
        Ok(())
    }
}

impl DeviceStatus for SimulatedHost {
    fn battery_percent(&self) -> Result<u8, AdapterError> {
        self.state.lock().battery.clone()
    }

    fn local_time(&self) -> NaiveTime {
        self.state.lock().local_time
    }
}

struct SimulatedEngineFactory {
    host: Arc<SimulatedHost>,
}

impl SpeechEngineFactory for SimulatedEngineFactory {
    fn is_available(&self) -> bool {
        self.host.state.lock().recognition_available
    }

    fn create(&mut self, generation: u64) -> Result<Box<dyn SpeechEngine>, AdapterError> {
        let mut state = self.host.state.lock();
        if !state.recognition_available {
            return Err(AdapterError::Unavailable("speech recognition".to_string()));
        }
        state.engines_created += 1;
        state.last_generation = generation;
        Ok(Box::new(SimulatedEngine {
            host: self.host.clone(),
        }))
    }
}

struct SimulatedEngine {
    host: Arc<SimulatedHost>,
}

impl SpeechEngine for SimulatedEngine {
    fn start(&mut self, config: &RecognitionConfig) -> Result<(), AdapterError> {
        let mut state = self.host.state.lock();
        if let Some(err) = state.engine_start_error.clone() {
            return Err(err);
        }
        state.engine_starts.push(config.clone());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AdapterError> {
        self.host.state.lock().engine_stops += 1;
        Ok(())
    }

    fn destroy(&mut self) {
        self.host.state.lock().engines_destroyed += 1;
    }
}
