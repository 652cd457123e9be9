//! Audio output arbitration for Velox
//!
//! Tones and speech both go through the platform's audio focus mechanism so
//! that prompts never collide with music or navigation output.

pub mod focus;

pub use focus::{AudioFocusArbiter, AudioFocusHost, FocusChange, FocusState};
