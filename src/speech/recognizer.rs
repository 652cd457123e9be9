//! Speech recognition engine adapter
//!
//! Wraps the host recognition engine behind a handle that can be destroyed and
//! recreated. Each engine instance is created with a generation number; the
//! host tags every callback with it so that late events from a destroyed
//! instance are recognised and dropped.
//!
//! Reinitialisation and an active capture are mutually exclusive: asking for
//! one while the other is in progress logs and returns without doing anything.

use serde::{Deserialize, Serialize};

use crate::config::RecognitionConfig;
use crate::error::{AdapterError, Capability, Result, VeloxError};

/// Error categories reported by the recognition engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    /// Speech was heard but not recognised
    NoMatch,
    Network,
    NetworkTimeout,
    /// The engine's client side is in a bad state and needs rebuilding
    ClientFault,
    /// Microphone failure
    Audio,
    PermissionDenied,
    Busy,
    Server,
    /// No speech before the engine gave up
    SpeechTimeout,
    Unknown,
}

impl EngineErrorKind {
    pub fn description(&self) -> &'static str {
        match self {
            EngineErrorKind::NoMatch => "Speech not recognised",
            EngineErrorKind::Network => "Network error",
            EngineErrorKind::NetworkTimeout => "Network timeout",
            EngineErrorKind::ClientFault => "Recognition client fault",
            EngineErrorKind::Audio => "Audio capture error",
            EngineErrorKind::PermissionDenied => "Insufficient permissions",
            EngineErrorKind::Busy => "Recognizer busy",
            EngineErrorKind::Server => "Recognition server error",
            EngineErrorKind::SpeechTimeout => "No speech detected",
            EngineErrorKind::Unknown => "Unknown recognition error",
        }
    }

    /// Whether a partial transcript can stand in for the missing result
    pub fn allows_fallback(&self) -> bool {
        matches!(
            self,
            EngineErrorKind::NoMatch | EngineErrorKind::Network | EngineErrorKind::NetworkTimeout
        )
    }
}

/// Callbacks from a recognition engine instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Microphone open, ready for speech
    Ready,
    PartialResult(String),
    /// Final alternatives, best first
    FinalResult(Vec<String>),
    Error(EngineErrorKind),
}

/// One live recognition engine instance
pub trait SpeechEngine: Send {
    fn start(&mut self, config: &RecognitionConfig) -> std::result::Result<(), AdapterError>;

    fn stop(&mut self) -> std::result::Result<(), AdapterError>;

    /// Tear the instance down; no callbacks may follow
    fn destroy(&mut self) {}
}

/// Creates recognition engine instances
pub trait SpeechEngineFactory: Send {
    /// Whether the platform offers speech recognition at all
    fn is_available(&self) -> bool;

    /// Create an instance whose callbacks carry `generation`
    fn create(
        &mut self,
        generation: u64,
    ) -> std::result::Result<Box<dyn SpeechEngine>, AdapterError>;
}

/// Serialises engine lifecycle against capture
pub struct SpeechEngineAdapter {
    factory: Box<dyn SpeechEngineFactory>,
    engine: Option<Box<dyn SpeechEngine>>,
    generation: u64,
    listening: bool,
    reinitializing: bool,
}

impl SpeechEngineAdapter {
    /// Create an adapter without an engine instance
    pub fn new(factory: Box<dyn SpeechEngineFactory>) -> Self {
        Self {
            factory,
            engine: None,
            generation: 0,
            listening: false,
            reinitializing: false,
        }
    }

    /// Whether an instance exists and is not being rebuilt
    pub fn is_ready(&self) -> bool {
        self.engine.is_some() && !self.reinitializing
    }

    /// Whether a capture is in progress
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn is_reinitializing(&self) -> bool {
        self.reinitializing
    }

    /// Generation of the current engine instance
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether an event tagged with `generation` comes from the live instance
    pub fn is_current(&self, generation: u64) -> bool {
        self.engine.is_some() && generation == self.generation
    }

    /// Create the engine instance, replacing any previous one
    pub fn initialize(&mut self) -> Result<()> {
        self.destroy_engine();

        if !self.factory.is_available() {
            tracing::error!("Speech recognition is not available on this device");
            return Err(VeloxError::CapabilityUnavailable(
                Capability::SpeechRecognition,
            ));
        }

        self.generation += 1;
        match self.factory.create(self.generation) {
            Ok(engine) => {
                self.engine = Some(engine);
                tracing::info!(
                    "Speech engine initialised (generation {})",
                    self.generation
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to create speech engine: {}", e);
                Err(VeloxError::CapabilityUnavailable(
                    Capability::SpeechRecognition,
                ))
            }
        }
    }

    /// Start a capture.
    ///
    /// A missing engine (failed earlier reinit) gets one creation attempt here.
    pub fn start_listening(&mut self, config: &RecognitionConfig) -> Result<()> {
        if self.reinitializing {
            tracing::warn!("Speech engine is reinitialising, not starting capture");
            return Err(VeloxError::EngineNotReady);
        }
        if self.listening {
            tracing::warn!("Already listening");
            return Ok(());
        }
        if self.engine.is_none() {
            tracing::info!("No speech engine instance, attempting to create one");
            self.initialize()?;
        }

        let Some(engine) = self.engine.as_mut() else {
            return Err(VeloxError::EngineNotReady);
        };

        match engine.start(config) {
            Ok(()) => {
                self.listening = true;
                tracing::info!("Speech engine: listening started");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to start listening: {}", e);
                self.listening = false;
                Err(e.into())
            }
        }
    }

    /// Stop an active capture. No-op when not listening.
    pub fn stop_listening(&mut self) {
        if !self.listening {
            return;
        }

        if let Some(engine) = self.engine.as_mut() {
            if let Err(e) = engine.stop() {
                tracing::warn!("Error stopping speech engine: {}", e);
            } else {
                tracing::debug!("Stopped listening");
            }
        }
        self.listening = false;
    }

    /// The engine delivered a final result or an error; capture is over
    pub fn on_capture_finished(&mut self) {
        self.listening = false;
    }

    /// Destroy and recreate the engine instance.
    ///
    /// Returns `Ok(false)` without touching the engine if a capture or another
    /// reinitialisation is in progress.
    pub fn reinitialize(&mut self) -> Result<bool> {
        if self.reinitializing {
            tracing::warn!("Already reinitialising, skipping");
            return Ok(false);
        }
        if self.listening {
            tracing::warn!("Capture in progress, skipping reinitialisation");
            return Ok(false);
        }

        self.reinitializing = true;
        let result = self.initialize();
        self.reinitializing = false;
        result.map(|()| true)
    }

    /// Stop capture and destroy the engine. Idempotent.
    pub fn shutdown(&mut self) {
        self.stop_listening();
        self.destroy_engine();
        self.reinitializing = false;
    }

    fn destroy_engine(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
            tracing::debug!("Speech engine generation {} destroyed", self.generation);
        }
    }
}
