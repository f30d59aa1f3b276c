//! State of the UI controls a reader is wired to.
//!
//! A control only exists if the [`ReaderConfig`] names a handle for it. The
//! reader updates these structs; a front-end draws them.

/// Construction parameters for a reader.
///
/// Each handle identifies a control in the host UI. `None` means the UI has
/// no such control, and the feature behind it is simply not wired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderConfig {
    pub play_button: Option<String>,
    pub pause_button: Option<String>,
    pub stop_button: Option<String>,
    pub chapter_title: Option<String>,
    pub voice_selection: Option<String>,
    pub volume_range: Option<String>,
    pub rate_range: Option<String>,
    /// Class token put on the element being read.
    pub highlight_class: String,
}

impl ReaderConfig {
    /// Config without any controls; narration can still be driven directly.
    pub fn new(highlight_class: impl Into<String>) -> Self {
        Self {
            highlight_class: highlight_class.into(),
            ..Self::default()
        }
    }

    /// Config with every control present under its default handle.
    pub fn with_all_controls(highlight_class: impl Into<String>) -> Self {
        Self {
            play_button: Some("play".to_string()),
            pause_button: Some("pause".to_string()),
            stop_button: Some("stop".to_string()),
            chapter_title: Some("chapter-title".to_string()),
            voice_selection: Some("voice".to_string()),
            volume_range: Some("volume".to_string()),
            rate_range: Some("rate".to_string()),
            highlight_class: highlight_class.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub handle: String,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleDisplay {
    pub handle: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSelector {
    pub handle: String,
    pub options: Vec<String>,
    pub selected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeInput {
    pub handle: String,
    pub value: String,
}

/// Input coming from the UI. Range and selection values arrive as the raw
/// strings the control holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    PlayClicked,
    PauseClicked,
    StopClicked,
    VolumeChanged(String),
    RateChanged(String),
    VoiceChanged(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Controls {
    pub play: Option<Button>,
    pub pause: Option<Button>,
    pub stop: Option<Button>,
    pub title: Option<TitleDisplay>,
    pub voice: Option<VoiceSelector>,
    pub volume: Option<RangeInput>,
    pub rate: Option<RangeInput>,
}

impl Controls {
    pub fn from_config(config: &ReaderConfig) -> Self {
        let button = |handle: &Option<String>, visible: bool| {
            handle.as_ref().map(|handle| Button {
                handle: handle.clone(),
                visible,
            })
        };
        let range = |handle: &Option<String>, value: &str| {
            handle.as_ref().map(|handle| RangeInput {
                handle: handle.clone(),
                value: value.to_string(),
            })
        };

        Self {
            play: button(&config.play_button, true),
            pause: button(&config.pause_button, false),
            stop: button(&config.stop_button, true),
            title: config.chapter_title.as_ref().map(|handle| TitleDisplay {
                handle: handle.clone(),
                text: String::new(),
            }),
            voice: config.voice_selection.as_ref().map(|handle| VoiceSelector {
                handle: handle.clone(),
                options: Vec::new(),
                selected: None,
            }),
            volume: range(&config.volume_range, "1"),
            rate: range(&config.rate_range, "1"),
        }
    }

    /// Show the pause button and hide play, or the other way round.
    pub fn show_playing(&mut self, playing: bool) {
        if let Some(play) = self.play.as_mut() {
            play.visible = !playing;
        }
        if let Some(pause) = self.pause.as_mut() {
            pause.visible = playing;
        }
    }

    pub fn play_visible(&self) -> bool {
        self.play.as_ref().is_some_and(|button| button.visible)
    }

    pub fn pause_visible(&self) -> bool {
        self.pause.as_ref().is_some_and(|button| button.visible)
    }
}
