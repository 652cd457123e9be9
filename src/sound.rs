//! Tone feedback for voice sessions
//!
//! Short non-verbal cues: the earcon that tells the user capture is about to
//! start, and the acknowledge tone that confirms a media command. Tones are
//! played through a host [`TonePlayer`] and must be released once they have
//! finished; the session controller schedules the release.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::AdapterError;

/// Tone types for different session events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// "Now listening" beep played when a session is armed
    Earcon,
    /// Confirmation that a media command was dispatched
    Acknowledge,
}

impl Tone {
    /// Name of the tone-generator preset for this tone
    pub fn preset(&self) -> &'static str {
        match self {
            Tone::Earcon => "prop_beep",
            Tone::Acknowledge => "prop_ack",
        }
    }
}

/// Host tone generator
pub trait TonePlayer: Send + Sync {
    /// Start playing `tone` at `volume` (0-100) for `duration`
    fn play_tone(&self, tone: Tone, volume: u8, duration: Duration) -> Result<(), AdapterError>;

    /// Free the generator used for `tone`
    fn release_tone(&self, tone: Tone);
}
