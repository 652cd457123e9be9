//! Voice session state machine
//!
//! One gesture (or a ringing phone) opens one voice session. The session takes
//! audio focus, cues the user, captures a command, carries it out and speaks
//! the result before giving focus back.
//!
//! ## States
//!
//! 1. **IDLE** - No session open
//! 2. **ARMING** - Focus held, earcon playing
//! 3. **LISTENING** - Speech engine capturing
//! 4. **INTERPRETING** - Transcript being mapped to a command
//! 5. **DISPATCHING** - Command side effect running
//! 6. **SPEAKING** - Confirmation, error phrase or caller prompt playing
//! 7. **RECOVERING** - Speech engine being rebuilt; no session exists
//!
//! ## State Transitions
//!
//! ```text
//!            trigger / ringing
//! ┌──────┐ ──────────────────► ┌────────┐  earcon   ┌───────────┐ transcript ┌──────────────┐
//! │ IDLE │                     │ ARMING │──────────►│ LISTENING │───────────►│ INTERPRETING │
//! └──────┘                     └────────┘           └───────────┘            └──────────────┘
//!  ▲  │ ▲                           │ caller prompt  ▲   │ error phrase             │
//!  │  │ │                           ▼                │   ▼                          ▼
//!  │  │ │        done          ┌──────────┐  reply   │                       ┌─────────────┐
//!  │  │ └──────────────────────│ SPEAKING │──────────┘◄──────────────────────│ DISPATCHING │
//!  │  │                        └──────────┘         confirmation           └─────────────┘
//!  │  │ client fault cooldown  ┌────────────┐
//!  │  └───────────────────────►│ RECOVERING │
//!  └───────────────────────────└────────────┘
//! ```
//!
//! Any open session returns to IDLE on cancel, shutdown, focus denial or an
//! unrecoverable engine error, releasing focus, capture, tones and timers.
//!
//! ## Events
//!
//! Every transition is published as a [`StateChange`] on a broadcast channel
//! obtained from [`VoiceSessionController::subscribe`].

pub mod controller;
pub mod state;

pub use controller::{SessionCollaborators, SessionTimer, VoiceSessionController};
pub use state::{
    SessionState, SessionStatus, SpeechFollowUp, StateChange, TransitionReason, VoiceSession,
};
