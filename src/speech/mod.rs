//! Narration engine capability.
//!
//! The reader never talks to a concrete synthesizer. It holds something
//! implementing [`SpeechEngine`], hands it an [`Utterance`] and later drains
//! the lifecycle events the engine queued while speaking.

mod command;
mod simulated;

pub use command::CommandSpeechEngine;
pub use simulated::{EngineCall, SimulatedSpeechEngine};

#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub name: String,
    pub lang: String,
    pub default: bool,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
            default: false,
        }
    }
}

/// A narration request. The reader keeps one for its whole lifetime and
/// rewrites its fields instead of building a new one per element.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<Voice>,
    pub lang: Option<String>,
    pub volume: f32,
    pub rate: f32,
}

impl Default for Utterance {
    fn default() -> Self {
        Utterance {
            text: String::new(),
            voice: None,
            lang: None,
            volume: 1.0,
            rate: 1.0,
        }
    }
}

impl Utterance {
    /// Length of the text in the unit engines report offsets in.
    pub fn text_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Lifecycle notifications queued by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechEvent {
    Start,
    Pause,
    Resume,
    /// Speaking stopped. `char_index` is how far into the text the engine got;
    /// it equals the text length only when the utterance ran to completion.
    End { char_index: usize },
    VoicesChanged,
}

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("no speech synthesizer found (tried: {tried})")]
    NoSynthesizer { tried: String },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while talking to the synthesizer: {0}")]
    Io(#[from] std::io::Error),
}

/// Platform narration engine.
///
/// Mirrors the browser's speech synthesis surface: one shared queue, a
/// speaking/paused status, and lifecycle events reported after the fact.
pub trait SpeechEngine {
    /// Queue `utterance` for speaking. The engine takes a snapshot; later
    /// changes to the utterance do not affect a request already queued.
    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError>;

    fn pause(&mut self);

    fn resume(&mut self);

    /// Drop everything queued or speaking. Reported as an `End` event with
    /// an offset short of the text length.
    fn cancel(&mut self);

    fn voices(&self) -> Vec<Voice>;

    /// True while an utterance is being spoken, including while paused.
    fn is_speaking(&self) -> bool;

    fn is_paused(&self) -> bool;

    /// Drain the events that happened since the previous call, oldest first.
    fn poll_events(&mut self) -> Vec<SpeechEvent>;
}

impl<T: SpeechEngine + ?Sized> SpeechEngine for Box<T> {
    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError> {
        (**self).speak(utterance)
    }

    fn pause(&mut self) {
        (**self).pause()
    }

    fn resume(&mut self) {
        (**self).resume()
    }

    fn cancel(&mut self) {
        (**self).cancel()
    }

    fn voices(&self) -> Vec<Voice> {
        (**self).voices()
    }

    fn is_speaking(&self) -> bool {
        (**self).is_speaking()
    }

    fn is_paused(&self) -> bool {
        (**self).is_paused()
    }

    fn poll_events(&mut self) -> Vec<SpeechEvent> {
        (**self).poll_events()
    }
}
