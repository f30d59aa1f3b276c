pub mod test_helpers {
    use crate::controls::ReaderConfig;
    use crate::document::Document;
    use crate::event_source::{Event, KeyCode, KeyModifiers, SimulatedEventSource};
    use crate::reader::NarratedReader;
    use crate::speech::{SimulatedSpeechEngine, Voice};
    use ratatui::buffer::Buffer;

    pub const HIGHLIGHT: &str = "ReaderHighlight";

    /// Reader over `html` with every control wired and two fake voices.
    pub fn simulated_reader(html: &str) -> NarratedReader<SimulatedSpeechEngine> {
        let engine = SimulatedSpeechEngine::with_voices(vec![
            Voice::new("Anna", "de-DE"),
            Voice::new("Daniel", "en-GB"),
        ]);
        NarratedReader::new(
            ReaderConfig::with_all_controls(HIGHLIGHT),
            engine,
            Document::parse(html),
        )
    }

    /// Flatten a rendered buffer into one string per row.
    pub fn buffer_lines(buffer: &Buffer) -> Vec<String> {
        let area = buffer.area;
        (area.top()..area.bottom())
            .map(|y| {
                (area.left()..area.right())
                    .map(|x| buffer[(x, y)].symbol())
                    .collect::<String>()
            })
            .collect()
    }

    /// Builder for creating test scenarios with simulated user input
    pub struct TestScenarioBuilder {
        events: Vec<Event>,
    }

    impl Default for TestScenarioBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestScenarioBuilder {
        pub fn new() -> Self {
            Self { events: Vec::new() }
        }

        pub fn press_char(mut self, c: char) -> Self {
            self.events.push(SimulatedEventSource::char_key(c));
            self
        }

        /// Space toggles between play and pause
        pub fn toggle_play(self) -> Self {
            self.press_char(' ')
        }

        pub fn stop(self) -> Self {
            self.press_char('s')
        }

        pub fn volume_up(self, times: usize) -> Self {
            (0..times).fold(self, |builder, _| builder.press_char('+'))
        }

        pub fn volume_down(self, times: usize) -> Self {
            (0..times).fold(self, |builder, _| builder.press_char('-'))
        }

        pub fn faster(self) -> Self {
            self.press_char(']')
        }

        pub fn next_voice(self) -> Self {
            self.press_char('v')
        }

        pub fn next_section(self) -> Self {
            self.press_char('n')
        }

        pub fn previous_section(self) -> Self {
            self.press_char('N')
        }

        pub fn press_esc(mut self) -> Self {
            self.events.push(SimulatedEventSource::key_event(
                KeyCode::Esc,
                KeyModifiers::empty(),
            ));
            self
        }

        pub fn quit(self) -> Self {
            self.press_char('q')
        }

        pub fn build(self) -> SimulatedEventSource {
            SimulatedEventSource::new(self.events)
        }
    }
}
