use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use log::{debug, info};
use ratatui::{
    Frame, Terminal,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use std::time::Duration;

use crate::controls::ControlEvent;
use crate::document::Section;
use crate::event_source::{Event, EventSource};
use crate::reader::{MAX_RATE, MAX_VOLUME, MIN_RATE, MIN_VOLUME, NarratedReader};
use crate::speech::SpeechEngine;
use crate::traversal::Cursor;

const VOLUME_STEP: f32 = 0.1;
const RATE_STEP: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    Quit,
}

/// Terminal front-end: draws the chapter with the element being read
/// highlighted and turns key presses into reader controls.
pub struct App<E: SpeechEngine> {
    pub reader: NarratedReader<E>,
    sections: Vec<Section>,
    current_section: Option<usize>,
}

impl<E: SpeechEngine> App<E> {
    pub fn new(reader: NarratedReader<E>) -> Self {
        let sections = reader.document().sections();
        debug!("Document has {} sections", sections.len());
        Self {
            reader,
            sections,
            current_section: None,
        }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn current_section(&self) -> Option<usize> {
        self.current_section
    }

    /// Point the reader at section `index`. Out-of-range indices are ignored.
    pub fn open_section(&mut self, index: usize) {
        let Some(section) = self.sections.get(index) else {
            debug!("No section {index}");
            return;
        };
        info!("Opening section {} ({})", index + 1, section.title);
        self.reader.initialize(&section.title, section.node);
        self.current_section = Some(index);
    }

    pub fn handle_key_event(&mut self, key: KeyEvent) -> Option<AppAction> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(AppAction::Quit);
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Some(AppAction::Quit),
            KeyCode::Char(' ') => {
                let event = if self.reader.controls().pause_visible() {
                    ControlEvent::PauseClicked
                } else {
                    ControlEvent::PlayClicked
                };
                self.reader.dispatch(event);
            }
            KeyCode::Char('p') => self.reader.dispatch(ControlEvent::PlayClicked),
            KeyCode::Char('P') => self.reader.dispatch(ControlEvent::PauseClicked),
            KeyCode::Char('s') => self.reader.dispatch(ControlEvent::StopClicked),
            KeyCode::Char('+') | KeyCode::Char('=') => self.step_volume(VOLUME_STEP),
            KeyCode::Char('-') => self.step_volume(-VOLUME_STEP),
            KeyCode::Char(']') => self.step_rate(RATE_STEP),
            KeyCode::Char('[') => self.step_rate(-RATE_STEP),
            KeyCode::Char('v') => self.next_voice(),
            KeyCode::Char('n') => {
                let next = self.current_section.map_or(0, |index| index + 1);
                self.open_section(next);
            }
            KeyCode::Char('N') => {
                if let Some(previous) = self.current_section.and_then(|i| i.checked_sub(1)) {
                    self.open_section(previous);
                }
            }
            _ => {}
        }
        None
    }

    fn step_volume(&mut self, delta: f32) {
        let level = (self.reader.utterance().volume + delta).clamp(MIN_VOLUME, MAX_VOLUME);
        self.reader
            .dispatch(ControlEvent::VolumeChanged(format!("{level:.2}")));
    }

    fn step_rate(&mut self, delta: f32) {
        let rate = (self.reader.utterance().rate + delta).clamp(MIN_RATE, MAX_RATE);
        self.reader
            .dispatch(ControlEvent::RateChanged(format!("{rate:.2}")));
    }

    fn next_voice(&mut self) {
        let Some(selector) = self.reader.controls().voice.as_ref() else {
            return;
        };
        if selector.options.is_empty() {
            return;
        }
        let next = match &selector.selected {
            Some(selected) => selector
                .options
                .iter()
                .position(|option| option == selected)
                .map_or(0, |index| (index + 1) % selector.options.len()),
            None => 0,
        };
        let name = selector.options[next].clone();
        self.reader.dispatch(ControlEvent::VoiceChanged(name));
    }

    pub fn draw(&self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(f.area());

        let title = self
            .reader
            .controls()
            .title
            .as_ref()
            .map(|display| display.text.clone())
            .unwrap_or_default();
        let title = Paragraph::new(title)
            .block(Block::default().borders(Borders::ALL).title(" Reading "))
            .style(Style::default().add_modifier(Modifier::BOLD));
        f.render_widget(title, chunks[0]);

        let content_area = chunks[1];
        let (lines, focus_line) = self.content_lines();
        let visible = content_area.height.saturating_sub(2) as usize;
        let scroll = focus_line.map_or(0, |line| line.saturating_sub(visible / 2));
        let content = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL))
            .wrap(Wrap { trim: true })
            .scroll((scroll as u16, 0));
        f.render_widget(content, content_area);

        let help = " space play/pause | s stop | +/- volume | [/] rate | v voice | n/N section | q quit ";
        let status = Paragraph::new(self.status_line())
            .block(Block::default().borders(Borders::ALL).title(help))
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(status, chunks[2]);
    }

    /// Lines for every readable element, plus the line index of the element
    /// last scrolled into view.
    fn content_lines(&self) -> (Vec<Line<'static>>, Option<usize>) {
        let document = self.reader.document();
        let marker = &self.reader.config().highlight_class;
        let Some(chapter) = self.reader.chapter() else {
            return (vec![Line::from("Press n to open the first section")], None);
        };

        let mut lines = Vec::new();
        let mut focus_line = None;
        for reading in chapter.nodes().iter().filter(|node| node.is_readable()) {
            if document.scroll_target() == Some(reading.node) {
                focus_line = Some(lines.len());
            }
            let style = if document.class_list(reading.node).contains(marker) {
                Style::default().fg(Color::Black).bg(Color::Yellow)
            } else {
                Style::default()
            };
            for text in reading.text.lines() {
                lines.push(Line::from(Span::styled(text.to_string(), style)));
            }
            lines.push(Line::default());
        }

        if lines.is_empty() {
            lines.push(Line::from("Nothing to read in this section"));
        }
        (lines, focus_line)
    }

    fn status_line(&self) -> String {
        let controls = self.reader.controls();
        let utterance = self.reader.utterance();

        let mut parts = Vec::new();
        if controls.play_visible() {
            parts.push("[play]".to_string());
        }
        if controls.pause_visible() {
            parts.push("[pause]".to_string());
        }
        if controls.stop.is_some() {
            parts.push("[stop]".to_string());
        }
        parts.push(format!("vol {:.2}", utterance.volume));
        parts.push(format!("rate {:.2}", utterance.rate));
        let voice = utterance
            .voice
            .as_ref()
            .map_or("default", |voice| voice.name.as_str());
        parts.push(format!("voice {voice}"));
        if self.reader.cursor() == Some(Cursor::Exhausted) {
            parts.push("(end)".to_string());
        }
        parts.join("  ")
    }
}

pub fn run_app_with_event_source<B: ratatui::backend::Backend, E: SpeechEngine>(
    terminal: &mut Terminal<B>,
    app: &mut App<E>,
    event_source: &mut dyn EventSource,
) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    let tick_rate = Duration::from_millis(50);
    let mut needs_redraw = true;

    loop {
        let mut events_processed = 0;
        let mut should_quit = false;

        while event_source.poll(Duration::from_millis(0))? && events_processed < 50 {
            let event = event_source.read()?;
            events_processed += 1;
            match event {
                Event::Key(key) => {
                    if app.handle_key_event(key) == Some(AppAction::Quit) {
                        should_quit = true;
                        break;
                    }
                    // the next key must see the state this one produced
                    app.reader.pump();
                }
                Event::Resize(_, _) => needs_redraw = true,
                _ => {}
            }
        }

        let speech_events = app.reader.pump();
        if events_processed > 0 || speech_events > 0 {
            needs_redraw = true;
        }

        if needs_redraw {
            terminal.draw(|f| app.draw(f))?;
            needs_redraw = false;
        }

        if should_quit {
            return Ok(());
        }

        if events_processed == 0 {
            let _ = event_source.poll(tick_rate);
        }
    }
}
