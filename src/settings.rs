use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

use crate::reader::{MAX_RATE, MAX_VOLUME, MIN_RATE, MIN_VOLUME};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "readaloud";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_level")]
    pub volume: f32,

    #[serde(default = "default_level")]
    pub rate: f32,

    /// Voice name as listed by the synthesizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    #[serde(default = "default_highlight_class")]
    pub highlight_class: String,

    /// Synthesizer binary; auto-detected when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesizer: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_level() -> f32 {
    1.0
}

fn default_highlight_class() -> String {
    "ReaderHighlight".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            volume: default_level(),
            rate: default_level(),
            voice: None,
            highlight_class: default_highlight_class(),
            synthesizer: None,
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Replace values the reader would reject with their defaults.
    fn sanitize(&mut self) {
        if !(MIN_VOLUME..=MAX_VOLUME).contains(&self.volume) {
            warn!("Volume {} out of range, using default", self.volume);
            self.volume = default_level();
        }
        if !(MIN_RATE..=MAX_RATE).contains(&self.rate) {
            warn!("Rate {} out of range, using default", self.rate);
            self.rate = default_level();
        }
        if self.highlight_class.split_whitespace().count() != 1 {
            warn!(
                "Highlight class {:?} is not a single token, using default",
                self.highlight_class
            );
            self.highlight_class = default_highlight_class();
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from `path`, or from the user config directory. A missing
/// file is created with defaults. On any failure the defaults stay in place
/// and the error is returned for the caller to report, since this runs
/// before logging is set up.
pub fn load_settings(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => preferred_config_path()
            .context("could not determine config directory, using default settings")?,
    };

    if !path.exists() {
        info!("Settings file not found, creating with defaults at {path:?}");
        return save_settings_to_file(&get_settings(), &path);
    }

    let settings = read_settings_file(&path)
        .with_context(|| format!("failed to load settings file {path:?}"))?;
    debug!("Loaded settings from {path:?}");
    if let Ok(mut global) = SETTINGS.write() {
        *global = settings;
    }
    Ok(())
}

pub fn read_settings_file(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)?;
    let mut settings: Settings = serde_yaml::from_str(&content)?;
    settings.sanitize();
    settings.version = CURRENT_VERSION;
    Ok(settings)
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config directory {parent:?}"))?;
        }
    }

    fs::write(path, generate_settings_yaml(settings))
        .with_context(|| format!("failed to save settings to {path:?}"))?;
    debug!("Saved settings to {path:?}");
    Ok(())
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str("# Loudness, 0.0 to 1.0\n");
    content.push_str(&format!("volume: {}\n", settings.volume));
    content.push_str("# Speaking rate, 0.1 to 10.0 (1.0 is normal speed)\n");
    content.push_str(&format!("rate: {}\n", settings.rate));
    match &settings.voice {
        Some(voice) => content.push_str(&format!("voice: \"{voice}\"\n")),
        None => content.push_str("# voice: \"English_(Great_Britain)\"\n"),
    }
    content.push_str(&format!(
        "highlight_class: \"{}\"\n",
        settings.highlight_class
    ));
    match &settings.synthesizer {
        Some(program) => content.push_str(&format!("synthesizer: \"{program}\"\n")),
        None => content.push_str("# synthesizer: \"espeak-ng\"\n"),
    }
    content.push_str(&format!("log_level: {}\n", settings.log_level));

    content
}

pub fn get_settings() -> Settings {
    SETTINGS
        .read()
        .map(|s| s.clone())
        .unwrap_or_default()
}
