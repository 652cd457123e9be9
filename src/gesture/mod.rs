//! Gesture detection
//!
//! Turns raw volume-key events and accelerometer samples into [`Trigger`]s.
//! Two paths feed the same output:
//!
//! - **Long press**: holding volume-down for the configured threshold. Normal
//!   short presses still step the volume down by one.
//! - **Shake**: a sample whose combined acceleration exceeds the threshold,
//!   debounced by the slop window.
//!
//! A missing button or accelerometer is reported once at construction and the
//! corresponding path stays inert for the lifetime of the detector. An enabled
//! shake path holds its own wake lock until [`GestureDetector::shutdown`].

pub mod shake;
pub mod volume_button;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::config::GestureConfig;
use crate::error::Capability;
use crate::platform::{Haptics, HostCapabilities, VolumeControl, WakeLock};

pub use shake::ShakeDetector;
pub use volume_button::{ButtonTimer, GestureState, VolumeButtonDetector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAction {
    Down,
    Up,
}

/// Hardware key event for the designated button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub action: KeyAction,
    pub repeat_count: u32,
}

/// One 3-axis accelerometer sample (m/s²)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    LongPress,
    Shake,
    /// Operator request, bypassing gesture detection
    Manual,
}

/// A qualifying gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub source: TriggerSource,
}

pub struct GestureDetector {
    button: VolumeButtonDetector,
    shake: ShakeDetector,
    unavailable: Vec<Capability>,
}

impl GestureDetector {
    /// Build both detection paths and start shake detection if enabled
    pub fn new(
        config: &GestureConfig,
        capabilities: HostCapabilities,
        volume: Arc<dyn VolumeControl>,
        haptics: Arc<dyn Haptics>,
        wake_lock: Arc<dyn WakeLock>,
    ) -> Self {
        let mut unavailable = Vec::new();

        if !capabilities.volume_button {
            tracing::error!("Volume button key filtering unavailable, long press disabled");
            unavailable.push(Capability::VolumeButton);
        }
        if !capabilities.accelerometer {
            tracing::error!("No accelerometer found, shake detection disabled");
            unavailable.push(Capability::Accelerometer);
        }

        let button = VolumeButtonDetector::new(
            config,
            capabilities.volume_button && config.volume_button_enabled,
            volume,
            haptics,
            wake_lock.clone(),
        );
        let mut shake = ShakeDetector::new(
            config,
            capabilities.accelerometer && config.shake_enabled,
            wake_lock,
        );
        shake.start();

        tracing::info!(
            "Gesture detector ready (long press: {}, shake: {})",
            button.is_enabled(),
            shake.is_enabled()
        );

        Self {
            button,
            shake,
            unavailable,
        }
    }

    /// Capabilities that were missing at construction
    pub fn unavailable(&self) -> &[Capability] {
        &self.unavailable
    }

    /// Returns the volume button state
    pub fn button_state(&self) -> &GestureState {
        self.button.state()
    }

    /// Feed a key event. Returns whether the platform should drop it.
    pub fn on_key_event(&mut self, event: KeyEvent, now: Instant) -> bool {
        self.button.on_key_event(event, now)
    }

    /// Feed an accelerometer sample
    pub fn on_motion_sample(&mut self, sample: MotionSample, now: Instant) -> Option<Trigger> {
        self.shake.on_motion_sample(sample, now)
    }

    /// Earliest pending button timer
    pub fn next_deadline(&self) -> Option<Instant> {
        self.button.next_deadline()
    }

    /// Run due timers; see [`VolumeButtonDetector::fire_due`]
    pub fn fire_due(&mut self, now: Instant) -> Option<Trigger> {
        self.button.fire_due(now)
    }

    /// Cancel timers and release every wake lock. Idempotent.
    pub fn shutdown(&mut self) {
        self.button.shutdown();
        self.shake.shutdown();
    }
}
