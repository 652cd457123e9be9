//! Shake detection from accelerometer samples
//!
//! While enabled the detector keeps a partial wake lock so samples keep
//! arriving with the screen off.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::GestureConfig;
use crate::platform::{WakeLock, WakeLockTag};

use super::{MotionSample, Trigger, TriggerSource};

/// Standard gravity (m/s²)
pub const GRAVITY_EARTH: f32 = 9.806_65;

impl MotionSample {
    /// Combined acceleration in g, close to 1.0 at rest
    pub fn g_force(&self) -> f32 {
        let gx = self.x / GRAVITY_EARTH;
        let gy = self.y / GRAVITY_EARTH;
        let gz = self.z / GRAVITY_EARTH;
        (gx * gx + gy * gy + gz * gz).sqrt()
    }
}

pub struct ShakeDetector {
    enabled: bool,
    threshold_g: f32,
    slop: Duration,
    last_shake: Option<Instant>,
    wake_lock: Arc<dyn WakeLock>,
    wake_lock_timeout: Duration,
    wake_lock_held: bool,
}

impl ShakeDetector {
    /// Create a detector. Call [`start`](Self::start) to take the wake lock.
    pub fn new(config: &GestureConfig, enabled: bool, wake_lock: Arc<dyn WakeLock>) -> Self {
        Self {
            enabled,
            threshold_g: config.shake_threshold_g,
            slop: config.shake_slop(),
            last_shake: None,
            wake_lock,
            wake_lock_timeout: config.shake_wake_lock_timeout(),
            wake_lock_held: false,
        }
    }

    /// Whether shake samples can produce triggers
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Take the wake lock for an enabled detector. Idempotent.
    pub fn start(&mut self) {
        if !self.enabled || self.wake_lock_held {
            return;
        }
        match self
            .wake_lock
            .acquire_wake_lock(WakeLockTag::Shake, self.wake_lock_timeout)
        {
            Ok(()) => {
                self.wake_lock_held = true;
                tracing::debug!("Shake wake lock acquired");
            }
            Err(e) => tracing::warn!("Failed to acquire shake wake lock: {}", e),
        }
    }

    /// Drop the wake lock. Idempotent.
    pub fn shutdown(&mut self) {
        if self.wake_lock_held {
            self.wake_lock.release_wake_lock(WakeLockTag::Shake);
            self.wake_lock_held = false;
            tracing::debug!("Shake wake lock released");
        }
    }

    /// Feed one accelerometer sample; returns a trigger for an accepted shake
    pub fn on_motion_sample(&mut self, sample: MotionSample, now: Instant) -> Option<Trigger> {
        if !self.enabled {
            return None;
        }

        let g_force = sample.g_force();
        if g_force <= self.threshold_g {
            return None;
        }

        if let Some(last) = self.last_shake {
            if now.saturating_duration_since(last) < self.slop {
                return None;
            }
        }

        self.last_shake = Some(now);
        tracing::info!("Shake detected (g-force {:.2})", g_force);
        Some(Trigger {
            source: TriggerSource::Shake,
        })
    }
}
