//! Transient audio focus arbitration
//!
//! The session controller must hold audio focus before any earcon, prompt or
//! capture. The host can take focus away at any time (a navigation prompt, a
//! ringing call); that clears the held flag and the controller re-acquires
//! before its next audible step.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AdapterError;

/// Platform audio focus service
pub trait AudioFocusHost: Send + Sync {
    /// Request transient exclusive focus. `Ok(false)` means denied.
    fn request_focus(&self) -> Result<bool, AdapterError>;

    /// Give up a previously granted request
    fn abandon_focus(&self) -> Result<(), AdapterError>;
}

/// Focus change notification from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusChange {
    Gained,
    Lost,
}

/// Snapshot of the arbiter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusState {
    pub held: bool,
}

/// Owns the focus request lifecycle
pub struct AudioFocusArbiter {
    host: Arc<dyn AudioFocusHost>,
    held: bool,
    /// A granted request that has not been abandoned yet. Survives focus loss
    /// so the request is still abandoned exactly once.
    outstanding: bool,
}

impl AudioFocusArbiter {
    /// Create an arbiter that holds no focus yet
    pub fn new(host: Arc<dyn AudioFocusHost>) -> Self {
        Self {
            host,
            held: false,
            outstanding: false,
        }
    }

    /// Returns whether focus is currently held
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Returns the current focus state
    pub fn state(&self) -> FocusState {
        FocusState { held: self.held }
    }

    /// Acquire focus. Idempotent while held; `false` if the host denies it.
    pub fn acquire(&mut self) -> bool {
        if self.held {
            tracing::debug!("Audio focus already held");
            return true;
        }

        match self.host.request_focus() {
            Ok(true) => {
                self.held = true;
                self.outstanding = true;
                tracing::debug!("Audio focus granted");
                true
            }
            Ok(false) => {
                tracing::warn!("Audio focus request denied");
                false
            }
            Err(e) => {
                tracing::error!("Audio focus request failed: {}", e);
                false
            }
        }
    }

    /// Abandon the outstanding request. No-op if nothing was granted.
    pub fn release(&mut self) {
        if !self.outstanding {
            self.held = false;
            return;
        }

        if let Err(e) = self.host.abandon_focus() {
            tracing::warn!("Error releasing audio focus: {}", e);
        }
        self.held = false;
        self.outstanding = false;
        tracing::debug!("Audio focus released");
    }

    /// Apply a host notification
    pub fn on_focus_changed(&mut self, change: FocusChange) {
        match change {
            FocusChange::Lost => {
                if self.held {
                    tracing::warn!("Lost audio focus");
                }
                self.held = false;
            }
            FocusChange::Gained => {
                if self.outstanding {
                    tracing::debug!("Regained audio focus");
                    self.held = true;
                }
            }
        }
    }
}
