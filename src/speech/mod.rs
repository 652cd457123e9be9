//! Speech input and output adapters

pub mod recognizer;
pub mod synthesizer;

pub use recognizer::{
    EngineErrorKind, EngineEvent, SpeechEngine, SpeechEngineAdapter, SpeechEngineFactory,
};
pub use synthesizer::{
    SpeechSynthesizer, SpeechSynthesizerAdapter, SynthEvent, UtteranceOutcome,
};
