//! Volume-down long press detection
//!
//! Every key event for the designated button is consumed while the detector is
//! enabled, so the platform never steps the volume during a hold. A short
//! press is replayed as exactly one manual volume step; a hold that outlives
//! the threshold becomes a trigger and the volume is put back to where it was
//! when the press started.
//!
//! The platform can still move the volume asynchronously around the release,
//! so a long-press release restores immediately and once more after a short
//! backup delay.

use std::sync::Arc;
use std::time::Instant;

use crate::config::GestureConfig;
use crate::platform::{Haptics, VolumeControl, WakeLock, WakeLockTag};
use crate::timers::TimerRegistry;

use super::{KeyAction, KeyEvent, Trigger, TriggerSource};

/// Timers owned by the button detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonTimer {
    LongPress,
    RestoreVolume,
    ReleaseWakeLock,
}

/// Per-press state, reset on every release
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GestureState {
    pub pressed: bool,
    pub press_start: Option<Instant>,
    pub is_long_press: bool,
    /// Volume captured on the first `Down` of the press
    pub pre_trigger_volume: Option<u32>,
    pub repeat_count: u32,
}

pub struct VolumeButtonDetector {
    config: GestureConfig,
    enabled: bool,
    volume: Arc<dyn VolumeControl>,
    haptics: Arc<dyn Haptics>,
    wake_lock: Arc<dyn WakeLock>,
    state: GestureState,
    /// Volume to restore after a long press, kept past the release
    restore_target: Option<u32>,
    timers: TimerRegistry<ButtonTimer>,
    wake_lock_held: bool,
}

impl VolumeButtonDetector {
    /// Create a detector; a disabled one passes every key through
    pub fn new(
        config: &GestureConfig,
        enabled: bool,
        volume: Arc<dyn VolumeControl>,
        haptics: Arc<dyn Haptics>,
        wake_lock: Arc<dyn WakeLock>,
    ) -> Self {
        Self {
            config: config.clone(),
            enabled,
            volume,
            haptics,
            wake_lock,
            state: GestureState::default(),
            restore_target: None,
            timers: TimerRegistry::new(),
            wake_lock_held: false,
        }
    }

    /// Returns whether key events are intercepted
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the current press state
    pub fn state(&self) -> &GestureState {
        &self.state
    }

    /// Earliest pending button timer
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Handle a key event, returning whether it was consumed
    pub fn on_key_event(&mut self, event: KeyEvent, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }

        tracing::debug!(
            "Volume key {:?} (repeat={}, pressed={})",
            event.action,
            event.repeat_count,
            self.state.pressed
        );

        match event.action {
            KeyAction::Down => {
                if self.state.pressed {
                    self.state.repeat_count = event.repeat_count;
                    return true;
                }

                // Leftovers from the previous long press
                self.timers.cancel(ButtonTimer::RestoreVolume);
                self.timers.cancel(ButtonTimer::ReleaseWakeLock);
                self.restore_target = None;

                self.ensure_wake_lock();

                let initial_volume = match self.volume.current_volume() {
                    Ok(level) => Some(level),
                    Err(e) => {
                        tracing::warn!("Could not read volume at press start: {}", e);
                        None
                    }
                };

                self.state = GestureState {
                    pressed: true,
                    press_start: Some(now),
                    is_long_press: false,
                    pre_trigger_volume: initial_volume,
                    repeat_count: event.repeat_count,
                };
                self.timers.arm(
                    ButtonTimer::LongPress,
                    now,
                    self.config.long_press_threshold(),
                );

                tracing::debug!("Button press started (initial volume: {:?})", initial_volume);
                true
            }
            KeyAction::Up => {
                if !self.state.pressed {
                    tracing::debug!("Release without a tracked press, ignoring");
                    return true;
                }

                self.timers.cancel(ButtonTimer::LongPress);
                let held_for = self
                    .state
                    .press_start
                    .map(|start| now.saturating_duration_since(start))
                    .unwrap_or_default();

                if self.state.is_long_press {
                    tracing::debug!("Long press released after {:?}", held_for);
                    self.restore_volume();
                    self.timers.arm(
                        ButtonTimer::RestoreVolume,
                        now,
                        self.config.volume_restore_backup(),
                    );
                    self.timers.arm(
                        ButtonTimer::ReleaseWakeLock,
                        now,
                        self.config.wake_lock_release(),
                    );
                } else {
                    tracing::debug!("Short press ({:?}), stepping volume down", held_for);
                    self.decrease_volume_once();
                    self.release_wake_lock();
                }

                self.state = GestureState::default();
                true
            }
        }
    }

    /// Run due timers, stopping at the first one that produces a trigger.
    /// Call again until it returns `None`.
    pub fn fire_due(&mut self, now: Instant) -> Option<Trigger> {
        while let Some(timer) = self.timers.pop_due(now) {
            match timer {
                ButtonTimer::LongPress => {
                    if !self.state.pressed {
                        continue;
                    }
                    tracing::info!("Long press detected");
                    self.state.is_long_press = true;
                    if let Err(e) = self.haptics.pulse(self.config.haptic_pulse()) {
                        tracing::warn!("Haptic feedback failed: {}", e);
                    }
                    self.restore_target = self.state.pre_trigger_volume;
                    self.restore_volume();
                    return Some(Trigger {
                        source: TriggerSource::LongPress,
                    });
                }
                ButtonTimer::RestoreVolume => {
                    self.restore_volume();
                    self.restore_target = None;
                }
                ButtonTimer::ReleaseWakeLock => {
                    self.release_wake_lock();
                }
            }
        }
        None
    }

    /// Cancel timers and drop the wake lock. Idempotent.
    pub fn shutdown(&mut self) {
        self.timers.cancel_all();
        self.release_wake_lock();
        self.state = GestureState::default();
        self.restore_target = None;
    }

    fn ensure_wake_lock(&mut self) {
        if self.wake_lock_held {
            return;
        }
        match self
            .wake_lock
            .acquire_wake_lock(WakeLockTag::VolumeButton, self.config.wake_lock_timeout())
        {
            Ok(()) => {
                self.wake_lock_held = true;
                tracing::debug!("Wake lock acquired");
            }
            Err(e) => tracing::warn!("Failed to acquire wake lock: {}", e),
        }
    }

    fn release_wake_lock(&mut self) {
        if self.wake_lock_held {
            self.wake_lock.release_wake_lock(WakeLockTag::VolumeButton);
            self.wake_lock_held = false;
            tracing::debug!("Wake lock released");
        }
    }

    fn restore_volume(&self) {
        let Some(target) = self.restore_target else {
            return;
        };

        match self.volume.current_volume() {
            Ok(current) if current == target => {
                tracing::debug!("Volume already correct: {}", target);
            }
            Ok(current) => match self.volume.set_volume(target, false) {
                Ok(()) => tracing::debug!("Volume restored: {} -> {}", current, target),
                Err(e) => tracing::warn!("Failed to restore volume: {}", e),
            },
            Err(e) => tracing::warn!("Failed to read volume for restore: {}", e),
        }
    }

    fn decrease_volume_once(&self) {
        match self.volume.current_volume() {
            Ok(current) if current > 0 => match self.volume.set_volume(current - 1, true) {
                Ok(()) => tracing::debug!("Volume decreased: {} -> {}", current, current - 1),
                Err(e) => tracing::warn!("Failed to decrease volume: {}", e),
            },
            Ok(_) => tracing::debug!("Volume already at minimum"),
            Err(e) => tracing::warn!("Failed to read volume: {}", e),
        }
    }
}
