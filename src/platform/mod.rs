//! Host platform collaborators
//!
//! The engine never talks to the operating system directly. Everything it
//! needs from the device (volume, haptics, wake locks, telephony, contacts,
//! media keys, battery and clock) is reached through the traits in this
//! module, and the host hands implementations over in a [`HostBindings`].
//!
//! Every method takes `&self`: host implementations are shared with callback
//! threads and are expected to use interior mutability. Failures are reported
//! as [`AdapterError`] and are converted into session transitions by the
//! controller, never propagated as panics.

pub mod simulated;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::AudioFocusHost;
use crate::error::AdapterError;
use crate::sound::TonePlayer;
use crate::speech::{SpeechEngineFactory, SpeechSynthesizer};

/// Media stream volume of the device
pub trait VolumeControl: Send + Sync {
    /// Current volume step
    fn current_volume(&self) -> Result<u32, AdapterError>;

    /// Set the volume step, optionally showing the system volume UI
    fn set_volume(&self, level: u32, show_ui: bool) -> Result<(), AdapterError>;
}

/// Vibration motor
pub trait Haptics: Send + Sync {
    fn pulse(&self, duration: Duration) -> Result<(), AdapterError>;
}

/// Which component holds a wake lock. Each tag is an independent lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeLockTag {
    /// Held across a volume button press
    VolumeButton,
    /// Held while the shake listener is registered
    Shake,
}

/// Partial wake lock keeping the CPU running while the screen is off
pub trait WakeLock: Send + Sync {
    /// Acquire the lock; the host releases it by itself after `timeout`
    fn acquire_wake_lock(&self, tag: WakeLockTag, timeout: Duration) -> Result<(), AdapterError>;

    fn release_wake_lock(&self, tag: WakeLockTag);
}

/// Call control
pub trait TelephonyBridge: Send + Sync {
    fn answer_call(&self) -> Result<(), AdapterError>;

    fn reject_call(&self) -> Result<(), AdapterError>;

    /// Place an outgoing call to a dialable number
    fn place_call(&self, number: &str) -> Result<(), AdapterError>;
}

/// Address book
pub trait ContactDirectory: Send + Sync {
    /// Find the number of the first contact whose name matches `name_query`
    fn lookup_number(&self, name_query: &str) -> Result<Option<String>, AdapterError>;

    /// Find the display name for a caller's number
    fn display_name(&self, number: &str) -> Result<Option<String>, AdapterError>;
}

/// Media transport keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKey {
    Next,
    Play,
    Pause,
}

pub trait MediaKeyDispatcher: Send + Sync {
    /// Dispatch a full press (down + up) of `key`
    fn dispatch_media_key(&self, key: MediaKey) -> Result<(), AdapterError>;
}

/// Battery and wall clock
pub trait DeviceStatus: Send + Sync {
    /// Battery charge in percent
    fn battery_percent(&self) -> Result<u8, AdapterError>;

    /// Local time of day
    fn local_time(&self) -> NaiveTime;
}

/// Telephony notifications delivered by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyEvent {
    /// The phone started ringing; `caller_id` is the raw number if known
    Ringing { caller_id: Option<String> },
}

/// Hardware the host reported at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCapabilities {
    /// Volume-down key events can be filtered
    pub volume_button: bool,
    /// An accelerometer is present
    pub accelerometer: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            volume_button: true,
            accelerometer: true,
        }
    }
}

/// All host collaborators the orchestration engine consumes
pub struct HostBindings {
    pub capabilities: HostCapabilities,
    pub volume: Arc<dyn VolumeControl>,
    pub haptics: Arc<dyn Haptics>,
    pub wake_lock: Arc<dyn WakeLock>,
    pub focus: Arc<dyn AudioFocusHost>,
    pub tones: Arc<dyn TonePlayer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub speech_engine: Box<dyn SpeechEngineFactory>,
    pub telephony: Arc<dyn TelephonyBridge>,
    pub contacts: Arc<dyn ContactDirectory>,
    pub media: Arc<dyn MediaKeyDispatcher>,
    pub device: Arc<dyn DeviceStatus>,
}
