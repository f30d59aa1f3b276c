use std::collections::VecDeque;

use super::{SpeechEngine, SpeechError, SpeechEvent, Utterance, Voice};

/// A call received by [`SimulatedSpeechEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Speak(Utterance),
    Pause,
    Resume,
    Cancel,
}

/// In-memory engine that never makes a sound.
///
/// Records every call and queues the same lifecycle events a browser engine
/// would. Nothing finishes on its own: call [`finish`](Self::finish) to end
/// the current utterance naturally.
#[derive(Debug, Default)]
pub struct SimulatedSpeechEngine {
    voices: Vec<Voice>,
    current: Option<Utterance>,
    queue: VecDeque<Utterance>,
    paused: bool,
    progress: usize,
    events: Vec<SpeechEvent>,
    calls: Vec<EngineCall>,
}

impl SimulatedSpeechEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voices(voices: Vec<Voice>) -> Self {
        Self {
            voices,
            ..Self::default()
        }
    }

    /// Replace the voice inventory and report the change.
    pub fn set_voices(&mut self, voices: Vec<Voice>) {
        self.voices = voices;
        self.events.push(SpeechEvent::VoicesChanged);
    }

    /// Pretend the engine has spoken `chars` characters of the current text.
    pub fn set_progress(&mut self, chars: usize) {
        self.progress = chars;
    }

    /// End the current utterance as if it had been spoken to the last
    /// character, then start the next queued one.
    pub fn finish(&mut self) {
        if let Some(utterance) = self.current.take() {
            self.events.push(SpeechEvent::End {
                char_index: utterance.text_len(),
            });
        }
        self.progress = 0;
        self.paused = false;
        self.start_next();
    }

    fn start_next(&mut self) {
        if let Some(next) = self.queue.pop_front() {
            self.current = Some(next);
            self.events.push(SpeechEvent::Start);
        }
    }

    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Texts of every `speak` call, in order.
    pub fn spoken_texts(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::Speak(utterance) => Some(utterance.text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn current_utterance(&self) -> Option<&Utterance> {
        self.current.as_ref()
    }
}

impl SpeechEngine for SimulatedSpeechEngine {
    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError> {
        self.calls.push(EngineCall::Speak(utterance.clone()));
        self.queue.push_back(utterance.clone());
        if self.current.is_none() {
            self.start_next();
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.calls.push(EngineCall::Pause);
        if self.current.is_some() && !self.paused {
            self.paused = true;
            self.events.push(SpeechEvent::Pause);
        }
    }

    fn resume(&mut self) {
        self.calls.push(EngineCall::Resume);
        if self.paused {
            self.paused = false;
            self.events.push(SpeechEvent::Resume);
        }
    }

    fn cancel(&mut self) {
        self.calls.push(EngineCall::Cancel);
        self.queue.clear();
        if let Some(utterance) = self.current.take() {
            let len = utterance.text_len();
            self.events.push(SpeechEvent::End {
                char_index: self.progress.min(len.saturating_sub(1)),
            });
        }
        self.progress = 0;
        self.paused = false;
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn is_speaking(&self) -> bool {
        self.current.is_some()
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn poll_events(&mut self) -> Vec<SpeechEvent> {
        std::mem::take(&mut self.events)
    }
}
