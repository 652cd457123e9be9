//! Error types shared across the orchestration engine.
//!
//! Host collaborators report failures as [`AdapterError`]. The session
//! controller converts those into transitions and never lets them escape;
//! [`VeloxError`] is what the engine itself reports to the operator.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::speech::EngineErrorKind;

/// A host capability the engine depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Hardware volume button with key filtering
    VolumeButton,
    /// Accelerometer for the shake path
    Accelerometer,
    /// On-device or remote speech recognition
    SpeechRecognition,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::VolumeButton => "volume button",
            Capability::Accelerometer => "accelerometer",
            Capability::SpeechRecognition => "speech recognition",
        };
        f.write_str(name)
    }
}

/// Failure reported by a host collaborator (telephony, focus, synthesizer...).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("Not available: {0}")]
    Unavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Host call failed: {0}")]
    Failed(String),
}

/// Errors surfaced by the orchestration engine.
#[derive(Debug, thiserror::Error)]
pub enum VeloxError {
    /// Permanent: the capability is missing and will not be retried
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(Capability),

    #[error("Speech engine fault: {}", .0.description())]
    EngineFault(EngineErrorKind),

    /// Speech engine is being rebuilt or already capturing
    #[error("Speech engine not ready")]
    EngineNotReady,

    #[error("Audio focus denied")]
    FocusDenied,

    #[error("{action} failed: {reason}")]
    ActionFailed { action: String, reason: String },

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, VeloxError>;
