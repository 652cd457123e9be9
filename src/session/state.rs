//! Voice session states and transition records
//!
//! The controller owns the side effects; this module only describes where a
//! session can be and which moves between states are legal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interpreter::{Command, SessionMode};
use crate::speech::EngineErrorKind;

/// Voice session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session open
    #[default]
    Idle,
    /// Focus acquired, earcon playing, capture about to start
    Arming,
    /// Speech engine capturing
    Listening,
    /// Mapping the transcript to a command
    Interpreting,
    /// Performing the command's side effect
    Dispatching,
    /// Confirmation or prompt being played
    Speaking,
    /// Rebuilding the speech engine after a client fault
    Recovering,
}

impl SessionState {
    /// Returns a human-readable description of the state
    pub fn description(&self) -> &'static str {
        match self {
            SessionState::Idle => "Waiting for a trigger",
            SessionState::Arming => "Preparing to listen",
            SessionState::Listening => "Listening for a command",
            SessionState::Interpreting => "Interpreting the command",
            SessionState::Dispatching => "Carrying out the command",
            SessionState::Speaking => "Speaking",
            SessionState::Recovering => "Restarting speech recognition",
        }
    }

    /// States in which a [`VoiceSession`] exists
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Idle | SessionState::Recovering)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        // Every active state can be torn down
        if self.is_active() && next == Idle {
            return true;
        }

        matches!(
            (self, next),
            (Idle, Arming)
                | (Idle, Recovering)
                | (Recovering, Idle)
                | (Arming, Listening)
                | (Arming, Speaking)
                | (Listening, Interpreting)
                | (Listening, Speaking)
                | (Interpreting, Dispatching)
                | (Dispatching, Speaking)
                | (Speaking, Listening)
        )
    }
}

/// What happens once the pending utterance has been spoken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpeechFollowUp {
    /// Close the session
    #[default]
    Close,
    /// Start capturing a reply
    Listen,
}

/// The one open voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSession {
    pub id: Uuid,
    pub mode: SessionMode,
    pub state: SessionState,
    /// Last non-empty partial result, used when no final result arrives
    pub partial_transcript: Option<String>,
    pub caller_name: Option<String>,
    pub follow_up: SpeechFollowUp,
    pub created_at: DateTime<Utc>,
}

impl VoiceSession {
    /// Start a session with a fresh id
    pub fn new(mode: SessionMode, caller_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            state: SessionState::Arming,
            partial_transcript: None,
            caller_name,
            follow_up: SpeechFollowUp::Close,
            created_at: Utc::now(),
        }
    }
}

/// Reason for entering a state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionReason {
    /// Gesture or manual trigger
    Triggered,
    /// Phone started ringing
    IncomingCall,
    /// Earcon finished or prompt done, capture started
    ListeningStarted,
    /// A transcript is available
    Transcript { fallback: bool },
    /// Transcript mapped to a command
    CommandRecognised { command: Command },
    /// Confirmation or prompt queued
    SpeechQueued,
    /// Confirmation tone playing
    ToneQueued,
    /// Session finished normally
    Completed,
    /// Capture ended without anything usable
    NoTranscript,
    /// Recognition failed
    EngineFault { kind: EngineErrorKind },
    /// Transcript did not map to a command valid for the session mode
    UnsupportedCommand,
    /// Audio focus could not be acquired
    FocusDenied,
    /// Synthesizer not ready or utterance failed
    SpeechOutputFailed,
    /// Capture could not be started
    ListenFailed { message: String },
    /// Cancelled by the operator
    Cancelled,
    /// Controller shut down
    Shutdown,
    /// Speech engine rebuild started
    EngineRecovery,
    /// Speech engine rebuild finished
    EngineRecovered { success: bool },
}

/// Published on every state change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    pub previous: SessionState,
    pub current: SessionState,
    pub reason: TransitionReason,
    pub session_id: Option<Uuid>,
}

/// Snapshot of the controller for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub description: String,
    pub session_id: Option<Uuid>,
    pub mode: Option<SessionMode>,
    pub caller_name: Option<String>,
    pub focus_held: bool,
    pub listening: bool,
    pub reinitializing: bool,
    pub reinit_pending: bool,
}
