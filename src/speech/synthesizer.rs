//! Speech output adapter
//!
//! Issues utterance ids, keeps track of the one utterance the session is
//! waiting on and filters host callbacks against it. Callbacks for an
//! utterance that was stopped or superseded are dropped.

use std::sync::Arc;

use crate::error::AdapterError;

/// Host text-to-speech engine
pub trait SpeechSynthesizer: Send + Sync {
    /// Engine initialised and a voice available
    fn is_ready(&self) -> bool;

    /// Queue `text`, flushing anything already queued
    fn speak(&self, text: &str, utterance_id: &str) -> Result<(), AdapterError>;

    fn stop_speaking(&self);
}

/// Utterance progress callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthEvent {
    UtteranceStarted(String),
    UtteranceDone(String),
    UtteranceError(String),
}

impl SynthEvent {
    pub fn utterance_id(&self) -> &str {
        match self {
            SynthEvent::UtteranceStarted(id)
            | SynthEvent::UtteranceDone(id)
            | SynthEvent::UtteranceError(id) => id,
        }
    }
}

/// Outcome of an accepted utterance callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceOutcome {
    Started,
    Done,
    Failed,
}

pub struct SpeechSynthesizerAdapter {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    next_seq: u64,
    pending: Option<String>,
}

impl SpeechSynthesizerAdapter {
    /// Wrap a host synthesizer
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            synthesizer,
            next_seq: 0,
            pending: None,
        }
    }

    /// Returns whether the host synthesizer can speak
    pub fn is_ready(&self) -> bool {
        self.synthesizer.is_ready()
    }

    /// Whether an utterance has been queued and not yet finished
    pub fn is_speaking(&self) -> bool {
        self.pending.is_some()
    }

    /// Id of the utterance still being spoken
    pub fn pending_utterance(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Speak `text`, returning the utterance id to wait for
    pub fn speak(&mut self, text: &str) -> Result<String, AdapterError> {
        if !self.synthesizer.is_ready() {
            return Err(AdapterError::Unavailable(
                "speech synthesizer not ready".to_string(),
            ));
        }

        self.next_seq += 1;
        let id = format!("velox-utterance-{}", self.next_seq);

        tracing::info!("Speaking: {}", text);
        self.synthesizer.speak(text, &id)?;
        self.pending = Some(id.clone());
        Ok(id)
    }

    /// Stop the pending utterance, if any
    pub fn stop(&mut self) {
        if self.pending.take().is_some() {
            self.synthesizer.stop_speaking();
            tracing::debug!("Stopped pending utterance");
        }
    }

    /// Match a host callback against the pending utterance.
    ///
    /// Returns `None` for callbacks about other utterances.
    pub fn accept(&mut self, event: &SynthEvent) -> Option<UtteranceOutcome> {
        if self.pending.as_deref() != Some(event.utterance_id()) {
            tracing::debug!("Ignoring callback for stale utterance {}", event.utterance_id());
            return None;
        }

        match event {
            SynthEvent::UtteranceStarted(_) => Some(UtteranceOutcome::Started),
            SynthEvent::UtteranceDone(_) => {
                self.pending = None;
                Some(UtteranceOutcome::Done)
            }
            SynthEvent::UtteranceError(id) => {
                tracing::error!("Utterance {} failed", id);
                self.pending = None;
                Some(UtteranceOutcome::Failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::simulated::SimulatedHost;

    #[test]
    fn test_utterance_ids_are_unique() {
        let host = SimulatedHost::new();
        let mut tts = SpeechSynthesizerAdapter::new(host.clone());

        let first = tts.speak("one").unwrap();
        let second = tts.speak("two").unwrap();
        assert_ne!(first, second);
        assert_eq!(tts.pending_utterance(), Some(second.as_str()));
        assert_eq!(host.spoken(), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_stale_callbacks_are_ignored() {
        let host = SimulatedHost::new();
        let mut tts = SpeechSynthesizerAdapter::new(host.clone());

        let first = tts.speak("one").unwrap();
        let second = tts.speak("two").unwrap();

        assert_eq!(tts.accept(&SynthEvent::UtteranceDone(first)), None);
        assert!(tts.is_speaking());
        assert_eq!(
            tts.accept(&SynthEvent::UtteranceDone(second)),
            Some(UtteranceOutcome::Done)
        );
        assert!(!tts.is_speaking());
    }

    #[test]
    fn test_error_clears_pending() {
        let host = SimulatedHost::new();
        let mut tts = SpeechSynthesizerAdapter::new(host.clone());

        let id = tts.speak("hello").unwrap();
        assert_eq!(
            tts.accept(&SynthEvent::UtteranceStarted(id.clone())),
            Some(UtteranceOutcome::Started)
        );
        assert_eq!(
            tts.accept(&SynthEvent::UtteranceError(id)),
            Some(UtteranceOutcome::Failed)
        );
        assert!(!tts.is_speaking());
    }

    #[test]
    fn test_not_ready_refuses_to_speak() {
        let host = SimulatedHost::new();
        host.set_synthesizer_ready(false);
        let mut tts = SpeechSynthesizerAdapter::new(host.clone());

        assert!(tts.speak("hello").is_err());
        assert!(host.spoken().is_empty());
    }

    #[test]
    fn test_stop_without_pending_is_noop() {
        let host = SimulatedHost::new();
        let mut tts = SpeechSynthesizerAdapter::new(host.clone());

        tts.stop();
        assert_eq!(host.speech_stops(), 0);
    }
}
