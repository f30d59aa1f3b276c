use std::fs::File;
use std::io::stdout;
use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, enable_raw_mode},
};
use log::{error, info, warn};
use ratatui::{Terminal, backend::CrosstermBackend};
use simplelog::{Config, LevelFilter, WriteLogger};

use readaloud::controls::ReaderConfig;
use readaloud::document::Document;
use readaloud::event_source::KeyboardEventSource;
use readaloud::main_app::{App, run_app_with_event_source};
use readaloud::panic_handler::{initialize_panic_handler, restore_terminal};
use readaloud::reader::NarratedReader;
use readaloud::settings::{self, Settings};
use readaloud::speech::{CommandSpeechEngine, SimulatedSpeechEngine, SpeechEngine, Voice};

/// Read an HTML document aloud, highlighting the element being spoken
#[derive(Parser)]
#[command(name = "readaloud")]
#[command(version, about, long_about = None)]
struct Cli {
    /// HTML file to read
    file: PathBuf,

    /// Section to open first (1-based)
    #[arg(short, long, default_value_t = 1)]
    section: usize,

    /// Synthesizer binary (espeak-ng, espeak); overrides the config file
    #[arg(long)]
    synthesizer: Option<String>,

    /// Use a silent engine instead of a real synthesizer
    #[arg(long)]
    dry_run: bool,

    /// Settings file (default: <config dir>/readaloud/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace
    #[arg(long)]
    log_level: Option<String>,

    /// Log file
    #[arg(long, default_value = "readaloud.log")]
    log_file: PathBuf,
}

fn init_logging(cli: &Cli, settings: &Settings) -> Result<()> {
    let level = cli.log_level.as_deref().unwrap_or(&settings.log_level);
    let level: LevelFilter = level
        .parse()
        .map_err(|_| anyhow!("invalid log level {level:?}"))?;
    WriteLogger::init(level, Config::default(), File::create(&cli.log_file)?)?;
    Ok(())
}

fn build_engine(cli: &Cli, settings: &Settings) -> Result<Box<dyn SpeechEngine>> {
    if cli.dry_run {
        info!("Dry run: using the silent engine");
        return Ok(Box::new(SimulatedSpeechEngine::with_voices(vec![
            Voice::new("silent", "en"),
        ])));
    }

    let engine = match cli.synthesizer.as_ref().or(settings.synthesizer.as_ref()) {
        Some(program) => CommandSpeechEngine::with_program(program)?,
        None => CommandSpeechEngine::detect()?,
    };
    info!("Using synthesizer {}", engine.program());
    Ok(Box::new(engine))
}

fn apply_settings<E: SpeechEngine>(reader: &mut NarratedReader<E>, settings: &Settings) {
    reader.set_volume(settings.volume);
    reader.set_rate(settings.rate);
    if let Some(voice) = &settings.voice {
        reader.set_voice(voice);
        if reader.utterance().voice.is_none() {
            warn!("Configured voice {voice:?} is not available");
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = settings::load_settings(cli.config.as_deref());
    let settings = settings::get_settings();
    init_logging(&cli, &settings)?;
    if let Err(e) = loaded {
        warn!("Using default settings: {e:#}");
    }

    info!("Starting readaloud on {:?}", cli.file);

    let document = Document::from_file(&cli.file)?;
    let engine = build_engine(&cli, &settings)?;

    let mut reader = NarratedReader::new(
        ReaderConfig::with_all_controls(settings.highlight_class.clone()),
        engine,
        document,
    );
    apply_settings(&mut reader, &settings);

    let mut app = App::new(reader);
    if app.sections().is_empty() {
        bail!("{} has no readable sections", cli.file.display());
    }
    let first = cli.section.saturating_sub(1);
    if first >= app.sections().len() {
        bail!(
            "section {} does not exist ({} available)",
            cli.section,
            app.sections().len()
        );
    }
    app.open_section(first);

    initialize_panic_handler();
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut event_source = KeyboardEventSource;
    let res = run_app_with_event_source(&mut terminal, &mut app, &mut event_source);

    app.reader.stop();
    restore_terminal();
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!("Application error: {err:?}");
        println!("{err:?}");
    }

    info!("Shutting down readaloud");
    Ok(())
}
