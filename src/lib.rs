//! Velox - Gesture-triggered, hands-free voice commands
//!
//! A long press on the volume-down key or a shake of the device opens a voice
//! session: an earcon plays, the speech engine listens, the transcript is
//! mapped to a command (call, time, battery, media keys, answer or reject a
//! ringing call) and the result is spoken back.
//!
//! Platform services are reached through the traits in [`platform`]. The
//! [`orchestrator::Orchestrator`] serialises every host callback onto a single
//! tokio task.

pub mod audio;
pub mod config;
pub mod error;
pub mod gesture;
pub mod interpreter;
pub mod logging;
pub mod orchestrator;
pub mod platform;
pub mod session;
pub mod sound;
pub mod speech;
pub mod timers;

pub use config::Config;
pub use error::{AdapterError, Capability, Result, VeloxError};
pub use orchestrator::{EventSender, InputEvent, Orchestrator, OrchestratorCore};
pub use platform::HostBindings;
pub use session::{SessionState, SessionStatus, StateChange, TransitionReason};
