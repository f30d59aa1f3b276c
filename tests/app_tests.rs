use ratatui::Terminal;
use ratatui::backend::TestBackend;
use readaloud::main_app::{App, run_app_with_event_source};
use readaloud::speech::{EngineCall, SimulatedSpeechEngine};
use readaloud::test_utils::test_helpers::{
    HIGHLIGHT, TestScenarioBuilder, buffer_lines, simulated_reader,
};

const MANUAL: &str = include_str!("testdata/manual.html");

fn manual_app() -> App<SimulatedSpeechEngine> {
    let mut app = App::new(simulated_reader(MANUAL));
    app.open_section(0);
    app
}

fn run(app: &mut App<SimulatedSpeechEngine>, scenario: TestScenarioBuilder) -> Vec<String> {
    let mut event_source = scenario.quit().build();
    let backend = TestBackend::new(100, 20);
    let mut terminal = Terminal::new(backend).unwrap();
    run_app_with_event_source(&mut terminal, app, &mut event_source).unwrap();
    buffer_lines(terminal.backend().buffer())
}

#[test]
fn test_space_starts_narration_and_highlights() {
    let mut app = manual_app();
    let screen = run(&mut app, TestScenarioBuilder::new().toggle_play());

    assert!(app.reader.is_reading());
    assert_eq!(app.reader.engine().spoken_texts(), vec!["Safety notes"]);
    assert_eq!(app.reader.document().elements_with_class(HIGHLIGHT).len(), 1);

    let text = screen.join("\n");
    assert!(text.contains("Safety notes"));
    assert!(text.contains("Keep the device away from water."));
    assert!(text.contains("[pause]"));
    assert!(!text.contains("[play]"));
}

#[test]
fn test_space_twice_pauses() {
    let mut app = manual_app();
    let screen = run(&mut app, TestScenarioBuilder::new().toggle_play().toggle_play());

    assert!(app.reader.engine().calls().contains(&EngineCall::Pause));
    assert!(app.reader.controls().play_visible());
    assert!(screen.join("\n").contains("[play]"));
}

#[test]
fn test_stop_key_resets_reader() {
    let mut app = manual_app();
    run(&mut app, TestScenarioBuilder::new().toggle_play().stop());

    assert!(!app.reader.is_reading());
    assert!(app.reader.document().elements_with_class(HIGHLIGHT).is_empty());
    assert_eq!(app.reader.utterance().text, "Safety notes");
}

#[test]
fn test_volume_keys_are_clamped() {
    let mut app = manual_app();
    run(&mut app, TestScenarioBuilder::new().volume_down(3));
    assert!((app.reader.utterance().volume - 0.7).abs() < 1e-6);

    let screen = run(&mut app, TestScenarioBuilder::new().volume_up(10));
    assert_eq!(app.reader.utterance().volume, 1.0);
    assert!(screen.join("\n").contains("vol 1.00"));
}

#[test]
fn test_rate_key_while_reading_restarts_current_element() {
    let mut app = manual_app();
    run(&mut app, TestScenarioBuilder::new().toggle_play().faster());

    assert_eq!(app.reader.utterance().rate, 1.25);
    assert_eq!(
        app.reader.engine().spoken_texts(),
        vec!["Safety notes", "Safety notes"]
    );
    assert!(app.reader.is_reading());
}

#[test]
fn test_voice_key_cycles_through_voices() {
    let mut app = manual_app();
    run(&mut app, TestScenarioBuilder::new().next_voice());
    assert_eq!(app.reader.utterance().voice.as_ref().unwrap().name, "Anna");

    let screen = run(&mut app, TestScenarioBuilder::new().next_voice());
    assert_eq!(app.reader.utterance().voice.as_ref().unwrap().name, "Daniel");
    assert!(screen.join("\n").contains("voice Daniel"));

    run(&mut app, TestScenarioBuilder::new().next_voice());
    assert_eq!(app.reader.utterance().voice.as_ref().unwrap().name, "Anna");
}

#[test]
fn test_section_navigation() {
    let mut app = manual_app();
    let screen = run(&mut app, TestScenarioBuilder::new().next_section());
    assert_eq!(app.current_section(), Some(1));
    assert!(screen.join("\n").contains("Connect the power cable."));

    let screen = run(&mut app, TestScenarioBuilder::new().next_section());
    assert_eq!(app.current_section(), Some(2));
    assert!(screen.join("\n").contains("Nothing to read in this section"));

    // past the last section nothing changes
    run(&mut app, TestScenarioBuilder::new().next_section());
    assert_eq!(app.current_section(), Some(2));

    run(
        &mut app,
        TestScenarioBuilder::new().previous_section().previous_section(),
    );
    assert_eq!(app.current_section(), Some(0));
    assert_eq!(
        app.reader.controls().title.as_ref().unwrap().text,
        "Safety notes"
    );
}

#[test]
fn test_escape_quits_before_remaining_keys() {
    let mut app = manual_app();
    let mut event_source = TestScenarioBuilder::new()
        .press_esc()
        .toggle_play()
        .build();
    let backend = TestBackend::new(80, 12);
    let mut terminal = Terminal::new(backend).unwrap();
    run_app_with_event_source(&mut terminal, &mut app, &mut event_source).unwrap();

    assert!(!app.reader.is_reading());
    assert_eq!(event_source.remaining(), 1);
}

#[test]
fn test_app_without_open_section_shows_hint() {
    let mut app = App::new(simulated_reader(MANUAL));
    let screen = run(&mut app, TestScenarioBuilder::new());
    assert!(screen.join("\n").contains("Press n to open the first section"));
    assert_eq!(app.current_section(), None);
}
