use log::{debug, error, info};

use crate::controls::{ControlEvent, Controls, ReaderConfig};
use crate::document::{Document, NodeId};
use crate::speech::{SpeechEngine, SpeechEvent, Utterance};
use crate::traversal::{Chapter, Cursor};

pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 1.0;
pub const MIN_RATE: f32 = 0.1;
pub const MAX_RATE: f32 = 10.0;

/// How an utterance stopped, judged from the offset the engine reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndKind {
    /// Spoken to the last character.
    Completed,
    /// Cut short by a cancel.
    Interrupted,
}

impl EndKind {
    pub fn classify(char_index: usize, text_len: usize) -> Self {
        if char_index >= text_len {
            EndKind::Completed
        } else {
            EndKind::Interrupted
        }
    }
}

/// Reads a document section aloud one element at a time.
///
/// The reader owns the document so it can mark the element being read with
/// the configured highlight class. All state changes happen either in a
/// control operation ([`play`](Self::play), [`set_volume`](Self::set_volume), ...)
/// or in [`handle_speech_event`](Self::handle_speech_event) when the engine
/// reports progress.
pub struct NarratedReader<E: SpeechEngine> {
    config: ReaderConfig,
    controls: Controls,
    engine: E,
    document: Document,
    chapter: Option<Chapter>,
    utterance: Utterance,
    reading: bool,
    /// `End` events still owed by utterances the reader cancelled itself
    /// (parameter restarts, chapter loads). Their offsets refer to text that
    /// is no longer in the utterance, so they are dropped unread.
    stale_ends: usize,
}

impl<E: SpeechEngine> NarratedReader<E> {
    pub fn new(config: ReaderConfig, engine: E, document: Document) -> Self {
        let controls = Controls::from_config(&config);
        let utterance = Utterance {
            lang: document.lang().map(str::to_string),
            ..Utterance::default()
        };

        let mut reader = Self {
            config,
            controls,
            engine,
            document,
            chapter: None,
            utterance,
            reading: false,
            stale_ends: 0,
        };
        reader.query_voices();
        reader
    }

    /// Load `container` as the chapter to read, replacing the previous one.
    pub fn initialize(&mut self, title: &str, container: NodeId) {
        info!("Loading chapter {title:?}");
        self.discard_pending_events();
        if self.engine.is_speaking() {
            self.stale_ends += 1;
        }
        self.engine.cancel();
        self.reading = false;
        self.controls.show_playing(false);
        self.clear_highlighting();

        if let Some(display) = self.controls.title.as_mut() {
            display.text = title.to_string();
        }

        self.chapter = Some(Chapter::flatten(&self.document, container));
        self.utterance.text.clear();
        if self.advance().is_none() {
            debug!("Chapter {title:?} has nothing to read");
        }
    }

    /// Move the cursor to the next readable element and load its text into
    /// the utterance.
    pub fn advance(&mut self) -> Option<NodeId> {
        let next = self.chapter.as_mut()?.advance()?;
        self.utterance.text = next.text.clone();
        Some(next.node)
    }

    fn rewind(&mut self) {
        let Some(chapter) = self.chapter.as_mut() else {
            return;
        };
        if let Some(first) = chapter.rewind() {
            self.utterance.text = first.text.clone();
        }
    }

    pub fn play(&mut self) {
        let has_text = !self.utterance.text.is_empty();
        if !self.engine.is_speaking() && has_text {
            self.speak();
        }
        if self.engine.is_paused() && has_text {
            self.engine.resume();
        }
    }

    pub fn pause(&mut self) {
        if self.engine.is_speaking() {
            self.engine.pause();
        }
    }

    /// Cancel narration outright. The engine answers with an interrupted
    /// `End`, which rewinds the chapter.
    pub fn stop(&mut self) {
        if self.engine.is_speaking() {
            self.engine.cancel();
        }
    }

    /// Levels outside `0.0..=1.0` are ignored.
    pub fn set_volume(&mut self, level: f32) {
        self.restart_with(|reader| {
            if (MIN_VOLUME..=MAX_VOLUME).contains(&level) {
                reader.utterance.volume = level;
            } else {
                debug!("Ignoring volume {level}");
            }
        });
    }

    /// Rates outside `0.1..=10.0` are ignored.
    pub fn set_rate(&mut self, rate: f32) {
        self.restart_with(|reader| {
            if (MIN_RATE..=MAX_RATE).contains(&rate) {
                reader.utterance.rate = rate;
            } else {
                debug!("Ignoring rate {rate}");
            }
        });
    }

    /// Unknown voice names are ignored.
    pub fn set_voice(&mut self, name: &str) {
        self.restart_with(|reader| {
            match reader.engine.voices().into_iter().find(|voice| voice.name == name) {
                Some(voice) => {
                    if let Some(selector) = reader.controls.voice.as_mut() {
                        selector.selected = Some(voice.name.clone());
                    }
                    reader.utterance.voice = Some(voice);
                }
                None => debug!("Ignoring unknown voice {name:?}"),
            }
        });
    }

    /// Engines pick up new parameters only for new requests, so a change
    /// while reading stops the current element and speaks it again.
    fn restart_with(&mut self, apply: impl FnOnce(&mut Self)) {
        let was_reading = self.reading;
        if was_reading {
            if self.engine.is_speaking() {
                self.stale_ends += 1;
            }
            self.engine.cancel();
        }

        apply(self);

        if was_reading {
            self.speak();
        }
    }

    fn speak(&mut self) {
        if let Err(e) = self.engine.speak(&self.utterance) {
            error!("Failed to start narration: {e}");
            self.reading = false;
            self.controls.show_playing(false);
        }
    }

    /// Route a UI event to the operation behind it. Events for controls the
    /// config does not name are dropped.
    pub fn dispatch(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::PlayClicked if self.controls.play.is_some() => self.play(),
            ControlEvent::PauseClicked if self.controls.pause.is_some() => self.pause(),
            ControlEvent::StopClicked if self.controls.stop.is_some() => self.stop(),
            ControlEvent::VolumeChanged(raw) => {
                let Some(input) = self.controls.volume.as_mut() else {
                    return;
                };
                input.value = raw.clone();
                match raw.trim().parse::<f32>() {
                    Ok(level) => self.set_volume(level),
                    Err(_) => debug!("Ignoring non-numeric volume {raw:?}"),
                }
            }
            ControlEvent::RateChanged(raw) => {
                let Some(input) = self.controls.rate.as_mut() else {
                    return;
                };
                input.value = raw.clone();
                match raw.trim().parse::<f32>() {
                    Ok(rate) => self.set_rate(rate),
                    Err(_) => debug!("Ignoring non-numeric rate {raw:?}"),
                }
            }
            ControlEvent::VoiceChanged(name) => {
                if self.controls.voice.is_some() {
                    self.set_voice(&name);
                }
            }
            other => debug!("No control wired for {other:?}"),
        }
    }

    /// Apply one lifecycle event reported by the engine.
    pub fn handle_speech_event(&mut self, event: SpeechEvent) {
        debug!("Speech event {event:?}");
        match event {
            SpeechEvent::Start => self.on_start(),
            SpeechEvent::Pause => {
                self.controls.show_playing(false);
                // Kept as set: a paused reader still counts as reading, so a
                // parameter change restarts narration.
                self.reading = true;
            }
            SpeechEvent::Resume => {
                self.controls.show_playing(true);
                self.reading = true;
            }
            SpeechEvent::End { char_index } => self.on_end(char_index),
            SpeechEvent::VoicesChanged => self.query_voices(),
        }
    }

    fn on_start(&mut self) {
        self.controls.show_playing(true);
        self.reading = true;

        if let Some(node) = self.current_node() {
            self.document
                .class_list_mut(node)
                .add(&self.config.highlight_class);
            self.document.scroll_into_view(node);
        }
    }

    fn on_end(&mut self, char_index: usize) {
        if self.stale_ends > 0 {
            self.stale_ends -= 1;
            debug!("Dropping end of a cancelled utterance at {char_index}");
            return;
        }

        let kind = EndKind::classify(char_index, self.utterance.text_len());

        match kind {
            EndKind::Completed => {
                self.clear_highlighting();
                if self.advance().is_some() {
                    self.speak();
                } else {
                    info!("Reached the end of the chapter");
                    self.controls.show_playing(false);
                    self.reading = false;
                    self.rewind();
                }
            }
            EndKind::Interrupted => {
                self.controls.show_playing(false);
                self.reading = false;
                self.rewind();
                self.clear_highlighting();
            }
        }
    }

    /// Drain the engine's queued events and apply them. Returns how many
    /// events were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let events = self.engine.poll_events();
            if events.is_empty() {
                return handled;
            }
            handled += events.len();
            for event in events {
                self.handle_speech_event(event);
            }
        }
    }

    /// Throw away events queued for the chapter being replaced. Voice list
    /// changes still apply.
    fn discard_pending_events(&mut self) {
        for event in self.engine.poll_events() {
            match event {
                SpeechEvent::End { .. } => self.stale_ends = self.stale_ends.saturating_sub(1),
                SpeechEvent::VoicesChanged => self.query_voices(),
                other => debug!("Dropping {other:?} from the previous chapter"),
            }
        }
    }

    /// Remove the highlight class from every element carrying it, not only
    /// from the current one.
    pub fn clear_highlighting(&mut self) {
        let marker = &self.config.highlight_class;
        for node in self.document.elements_with_class(marker) {
            self.document.class_list_mut(node).remove(marker);
        }
    }

    /// Refill the voice selector from the engine's current inventory.
    pub fn query_voices(&mut self) {
        let Some(selector) = self.controls.voice.as_mut() else {
            return;
        };
        selector.options = self
            .engine
            .voices()
            .into_iter()
            .map(|voice| voice.name)
            .collect();
        if let Some(selected) = &selector.selected {
            if !selector.options.contains(selected) {
                selector.selected = None;
            }
        }
        debug!("Voice selector now lists {} voices", selector.options.len());
    }

    pub fn is_reading(&self) -> bool {
        self.reading
    }

    /// `None` until the first chapter is loaded.
    pub fn cursor(&self) -> Option<Cursor> {
        self.chapter.as_ref().map(Chapter::cursor)
    }

    pub fn current_node(&self) -> Option<NodeId> {
        self.chapter
            .as_ref()
            .and_then(Chapter::current)
            .map(|reading| reading.node)
    }

    pub fn chapter(&self) -> Option<&Chapter> {
        self.chapter.as_ref()
    }

    pub fn utterance(&self) -> &Utterance {
        &self.utterance
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::{EngineCall, SimulatedSpeechEngine, Voice};

    const MARK: &str = "ReaderHighlight";

    fn reader(html: &str) -> NarratedReader<SimulatedSpeechEngine> {
        let engine = SimulatedSpeechEngine::with_voices(vec![
            Voice::new("Anna", "de"),
            Voice::new("Daniel", "en-GB"),
        ]);
        NarratedReader::new(
            ReaderConfig::with_all_controls(MARK),
            engine,
            Document::parse(html),
        )
    }

    fn load(reader: &mut NarratedReader<SimulatedSpeechEngine>, id: &str) {
        let container = reader.document().element_by_id(id).unwrap();
        reader.initialize("Chapter 1", container);
        reader.pump();
    }

    #[test]
    fn test_end_kind_classification() {
        assert_eq!(EndKind::classify(5, 5), EndKind::Completed);
        assert_eq!(EndKind::classify(4, 5), EndKind::Interrupted);
        assert_eq!(EndKind::classify(0, 5), EndKind::Interrupted);
    }

    #[test]
    fn test_new_reader_lists_voices_and_language() {
        let reader = reader(r#"<html lang="en"><body><div id="c"></div></body></html>"#);
        let selector = reader.controls().voice.as_ref().unwrap();
        assert_eq!(selector.options, vec!["Anna", "Daniel"]);
        assert_eq!(reader.utterance().lang.as_deref(), Some("en"));
        assert_eq!(reader.cursor(), None);
    }

    #[test]
    fn test_initialize_sets_title_and_first_text() {
        let mut reader = reader(r#"<div id="c"><p></p><p>First</p></div>"#);
        load(&mut reader, "c");
        assert_eq!(reader.controls().title.as_ref().unwrap().text, "Chapter 1");
        assert_eq!(reader.utterance().text, "First");
        assert_eq!(reader.cursor(), Some(Cursor::At(1)));
        assert!(!reader.is_reading());
    }

    #[test]
    fn test_start_highlights_and_scrolls() {
        let mut reader = reader(r#"<div id="c"><p id="a" class="intro">Hello</p></div>"#);
        load(&mut reader, "c");
        reader.play();
        reader.pump();

        let a = reader.document().element_by_id("a").unwrap();
        assert!(reader.is_reading());
        assert_eq!(reader.document().class_list(a).to_string(), format!("intro {MARK}"));
        assert_eq!(reader.document().scroll_target(), Some(a));
        assert!(!reader.controls().play_visible());
        assert!(reader.controls().pause_visible());
    }

    #[test]
    fn test_repeated_start_does_not_duplicate_marker() {
        let mut reader = reader(r#"<div id="c"><p id="a">Hello</p></div>"#);
        load(&mut reader, "c");
        reader.handle_speech_event(SpeechEvent::Start);
        reader.handle_speech_event(SpeechEvent::Start);
        let a = reader.document().element_by_id("a").unwrap();
        assert_eq!(reader.document().class_list(a).len(), 1);
    }

    #[test]
    fn test_play_on_empty_text_is_noop() {
        let mut reader = reader(r#"<div id="c"><p></p></div>"#);
        load(&mut reader, "c");
        reader.engine_mut().clear_calls();
        reader.play();
        assert!(reader.engine().calls().is_empty());
        assert_eq!(reader.cursor(), Some(Cursor::Exhausted));
    }

    #[test]
    fn test_play_resumes_when_paused() {
        let mut reader = reader(r#"<div id="c"><p>Hello</p></div>"#);
        load(&mut reader, "c");
        reader.play();
        reader.pause();
        reader.pump();
        assert!(reader.controls().play_visible());

        reader.engine_mut().clear_calls();
        reader.play();
        reader.pump();
        assert_eq!(reader.engine().calls(), &[EngineCall::Resume]);
        assert!(reader.controls().pause_visible());
    }

    #[test]
    fn test_pause_keeps_reading_flag() {
        let mut reader = reader(r#"<div id="c"><p>Hello</p></div>"#);
        load(&mut reader, "c");
        reader.play();
        reader.pause();
        reader.pump();
        assert!(reader.is_reading());
        assert!(reader.controls().play_visible());
        assert!(!reader.controls().pause_visible());
    }

    #[test]
    fn test_pause_and_stop_when_idle_do_nothing() {
        let mut reader = reader(r#"<div id="c"><p>Hello</p></div>"#);
        load(&mut reader, "c");
        reader.engine_mut().clear_calls();
        reader.pause();
        reader.stop();
        assert!(reader.engine().calls().is_empty());
    }

    #[test]
    fn test_volume_applied_when_idle_without_speaking() {
        let mut reader = reader(r#"<div id="c"><p>Hello</p></div>"#);
        load(&mut reader, "c");
        reader.engine_mut().clear_calls();
        reader.set_volume(0.3);
        assert_eq!(reader.utterance().volume, 0.3);
        assert!(reader.engine().calls().is_empty());
    }

    #[test]
    fn test_out_of_range_values_are_ignored() {
        let mut reader = reader(r#"<div id="c"><p>Hello</p></div>"#);
        load(&mut reader, "c");
        for level in [-0.1, 1.01, f32::NAN] {
            reader.set_volume(level);
            assert_eq!(reader.utterance().volume, 1.0);
        }
        for rate in [0.0, 0.09, 10.5, f32::INFINITY] {
            reader.set_rate(rate);
            assert_eq!(reader.utterance().rate, 1.0);
        }
        reader.set_volume(0.0);
        reader.set_rate(10.0);
        assert_eq!(reader.utterance().volume, 0.0);
        assert_eq!(reader.utterance().rate, 10.0);
    }

    #[test]
    fn test_set_rate_while_reading_restarts_current_element() {
        let mut reader = reader(r#"<div id="c"><p id="a">Hello</p><p>World</p></div>"#);
        load(&mut reader, "c");
        reader.play();
        reader.pump();
        reader.engine_mut().clear_calls();

        reader.set_rate(2.0);
        reader.pump();

        let calls = reader.engine().calls();
        assert_eq!(calls[0], EngineCall::Cancel);
        match &calls[1] {
            EngineCall::Speak(utterance) => {
                assert_eq!(utterance.text, "Hello");
                assert_eq!(utterance.rate, 2.0);
            }
            other => panic!("expected speak, got {other:?}"),
        }
        assert!(reader.is_reading());
        let a = reader.document().element_by_id("a").unwrap();
        assert_eq!(reader.current_node(), Some(a));
        assert!(reader.document().class_list(a).contains(MARK));
    }

    #[test]
    fn test_set_voice_matches_by_name() {
        let mut reader = reader(r#"<div id="c"><p>Hello</p></div>"#);
        load(&mut reader, "c");
        reader.set_voice("Daniel");
        assert_eq!(reader.utterance().voice.as_ref().unwrap().lang, "en-GB");
        assert_eq!(
            reader.controls().voice.as_ref().unwrap().selected.as_deref(),
            Some("Daniel")
        );
    }

    #[test]
    fn test_dispatch_parses_range_values() {
        let mut reader = reader(r#"<div id="c"><p>Hello</p></div>"#);
        load(&mut reader, "c");
        reader.dispatch(ControlEvent::VolumeChanged(" 0.25 ".to_string()));
        reader.dispatch(ControlEvent::RateChanged("fast".to_string()));
        assert_eq!(reader.utterance().volume, 0.25);
        assert_eq!(reader.utterance().rate, 1.0);
        assert_eq!(reader.controls().rate.as_ref().unwrap().value, "fast");
    }

    #[test]
    fn test_dispatch_without_controls_is_ignored() {
        let mut reader = NarratedReader::new(
            ReaderConfig::new(MARK),
            SimulatedSpeechEngine::with_voices(vec![Voice::new("Anna", "de")]),
            Document::parse(r#"<div id="c"><p>Hello</p></div>"#),
        );
        load(&mut reader, "c");
        reader.engine_mut().clear_calls();

        reader.dispatch(ControlEvent::PlayClicked);
        reader.dispatch(ControlEvent::VolumeChanged("0.5".to_string()));
        reader.dispatch(ControlEvent::VoiceChanged("Anna".to_string()));

        assert!(reader.engine().calls().is_empty());
        assert_eq!(reader.utterance().volume, 1.0);
        assert!(reader.utterance().voice.is_none());

        // The operations themselves still work without UI.
        reader.play();
        assert_eq!(reader.engine().spoken_texts(), vec!["Hello"]);
    }

    #[test]
    fn test_voices_changed_refreshes_selector() {
        let mut reader = reader(r#"<div id="c"><p>Hello</p></div>"#);
        reader.set_voice("Anna");
        reader
            .engine_mut()
            .set_voices(vec![Voice::new("Zira", "en-US")]);
        reader.pump();
        let selector = reader.controls().voice.as_ref().unwrap();
        assert_eq!(selector.options, vec!["Zira"]);
        assert_eq!(selector.selected, None);
    }

    #[test]
    fn test_clear_highlighting_removes_every_marker() {
        let mut reader = reader(&format!(
            r#"<div id="c"><p id="a" class="{MARK}">a</p><p id="b" class="x {MARK}">b</p></div>"#
        ));
        reader.clear_highlighting();
        let doc = reader.document();
        assert!(doc.elements_with_class(MARK).is_empty());
        assert!(doc.class_list(doc.element_by_id("a").unwrap()).is_empty());
        assert_eq!(doc.class_list(doc.element_by_id("b").unwrap()).to_string(), "x");
    }

    #[test]
    fn test_initialize_cancels_and_clears_previous_chapter() {
        let mut reader = reader(
            r#"<section id="one"><p id="a">One</p></section><section id="two"><p>Two</p></section>"#,
        );
        load(&mut reader, "one");
        reader.play();
        reader.pump();

        let two = reader.document().element_by_id("two").unwrap();
        reader.initialize("Chapter 2", two);
        assert!(reader.engine().calls().contains(&EngineCall::Cancel));
        assert!(reader.document().elements_with_class(MARK).is_empty());
        assert_eq!(reader.utterance().text, "Two");

        reader.pump();
        assert!(!reader.is_reading());
        assert_eq!(reader.utterance().text, "Two");
    }

    #[test]
    fn test_unhandled_end_from_previous_chapter_is_dropped() {
        let mut reader = reader(
            r#"<section id="one"><p>A much longer sentence</p></section>
               <section id="two"><p>Two</p><p>Three</p></section>"#,
        );
        load(&mut reader, "one");
        reader.play();
        reader.pump();
        // finished naturally, but the End has not been pumped yet
        reader.engine_mut().finish();
        reader.engine_mut().clear_calls();

        let two = reader.document().element_by_id("two").unwrap();
        reader.initialize("Chapter 2", two);
        reader.pump();

        assert!(!reader.is_reading());
        assert_eq!(reader.utterance().text, "Two");
        assert_eq!(reader.cursor(), Some(Cursor::At(0)));
        assert!(reader.engine().spoken_texts().is_empty());
    }

    #[test]
    fn test_speak_failure_leaves_reader_idle() {
        struct BrokenEngine;

        impl SpeechEngine for BrokenEngine {
            fn speak(&mut self, _: &Utterance) -> Result<(), crate::speech::SpeechError> {
                Err(crate::speech::SpeechError::NoSynthesizer {
                    tried: "none".to_string(),
                })
            }
            fn pause(&mut self) {}
            fn resume(&mut self) {}
            fn cancel(&mut self) {}
            fn voices(&self) -> Vec<Voice> {
                Vec::new()
            }
            fn is_speaking(&self) -> bool {
                false
            }
            fn is_paused(&self) -> bool {
                false
            }
            fn poll_events(&mut self) -> Vec<SpeechEvent> {
                Vec::new()
            }
        }

        let mut reader = NarratedReader::new(
            ReaderConfig::with_all_controls(MARK),
            BrokenEngine,
            Document::parse(r#"<div id="c"><p>Hello</p></div>"#),
        );
        let container = reader.document().element_by_id("c").unwrap();
        reader.initialize("Broken", container);
        reader.play();
        assert!(!reader.is_reading());
        assert!(reader.controls().play_visible());
    }
}
