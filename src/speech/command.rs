use log::{debug, error, warn};
use std::collections::VecDeque;
use std::io::Write;
use std::process::{Child, Command, Stdio};

use super::{SpeechEngine, SpeechError, SpeechEvent, Utterance, Voice};

const CANDIDATES: &[&str] = &["espeak-ng", "espeak"];
const DEFAULT_WPM: f32 = 175.0;
const MIN_WPM: f32 = 80.0;
const MAX_WPM: f32 = 500.0;

struct Running {
    child: Child,
    text_len: usize,
}

/// Host engine driving `espeak-ng` (or `espeak`) as a child process.
///
/// One process per utterance. Pausing stops the process with a signal, so
/// pause/resume only work on unix; elsewhere they are ignored.
pub struct CommandSpeechEngine {
    program: String,
    voices: Vec<Voice>,
    running: Option<Running>,
    queue: VecDeque<Utterance>,
    paused: bool,
    events: Vec<SpeechEvent>,
}

impl CommandSpeechEngine {
    /// Use the first synthesizer found on `PATH`.
    pub fn detect() -> Result<Self, SpeechError> {
        let program = CANDIDATES
            .iter()
            .find(|candidate| which::which(candidate).is_ok())
            .ok_or_else(|| SpeechError::NoSynthesizer {
                tried: CANDIDATES.join(", "),
            })?;
        Self::with_program(program)
    }

    pub fn with_program(program: &str) -> Result<Self, SpeechError> {
        if which::which(program).is_err() {
            return Err(SpeechError::NoSynthesizer {
                tried: program.to_string(),
            });
        }
        let voices = query_voices(program).unwrap_or_else(|e| {
            warn!("Could not list voices from {program}: {e}");
            Vec::new()
        });
        debug!("Using {program} with {} voices", voices.len());
        Ok(Self {
            program: program.to_string(),
            voices,
            running: None,
            queue: VecDeque::new(),
            paused: false,
            events: Vec::new(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn spawn(&mut self, utterance: &Utterance) -> Result<(), SpeechError> {
        let mut child = Command::new(&self.program)
            .args(synthesizer_args(utterance))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SpeechError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        feed_text(&mut child, &utterance.text)?;

        self.running = Some(Running {
            child,
            text_len: utterance.text_len(),
        });
        self.paused = false;
        self.events.push(SpeechEvent::Start);
        Ok(())
    }

    fn start_next(&mut self) {
        while let Some(next) = self.queue.pop_front() {
            match self.spawn(&next) {
                Ok(()) => return,
                Err(e) => error!("Failed to speak queued utterance: {e}"),
            }
        }
    }

    #[cfg(unix)]
    fn signal(&self, signal: libc::c_int) -> bool {
        let Some(running) = &self.running else {
            return false;
        };
        let Ok(pid) = libc::pid_t::try_from(running.child.id()) else {
            return false;
        };
        // SAFETY: the pid belongs to a child we spawned and have not reaped yet.
        unsafe { libc::kill(pid, signal) == 0 }
    }
}

impl SpeechEngine for CommandSpeechEngine {
    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError> {
        if self.running.is_some() {
            self.queue.push_back(utterance.clone());
            return Ok(());
        }
        self.spawn(utterance)
    }

    #[cfg(unix)]
    fn pause(&mut self) {
        if !self.paused && self.signal(libc::SIGSTOP) {
            self.paused = true;
            self.events.push(SpeechEvent::Pause);
        }
    }

    #[cfg(not(unix))]
    fn pause(&mut self) {
        warn!("Pausing {} is not supported on this platform", self.program);
    }

    #[cfg(unix)]
    fn resume(&mut self) {
        if self.paused && self.signal(libc::SIGCONT) {
            self.paused = false;
            self.events.push(SpeechEvent::Resume);
        }
    }

    #[cfg(not(unix))]
    fn resume(&mut self) {}

    fn cancel(&mut self) {
        self.queue.clear();
        if let Some(mut running) = self.running.take() {
            if let Err(e) = running.child.kill() {
                debug!("Synthesizer already gone on cancel: {e}");
            }
            let _ = running.child.wait();
            self.events.push(SpeechEvent::End { char_index: 0 });
        }
        self.paused = false;
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn is_speaking(&self) -> bool {
        self.running.is_some()
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn poll_events(&mut self) -> Vec<SpeechEvent> {
        let finished = match self.running.as_mut() {
            Some(running) => match running.child.try_wait() {
                Ok(Some(status)) => Some(if status.success() { running.text_len } else { 0 }),
                Ok(None) => None,
                Err(e) => {
                    error!("Failed to poll synthesizer: {e}");
                    Some(0)
                }
            },
            None => None,
        };

        if let Some(char_index) = finished {
            self.running = None;
            self.paused = false;
            self.events.push(SpeechEvent::End { char_index });
            self.start_next();
        }

        std::mem::take(&mut self.events)
    }
}

impl Drop for CommandSpeechEngine {
    fn drop(&mut self) {
        if let Some(mut running) = self.running.take() {
            let _ = running.child.kill();
            let _ = running.child.wait();
        }
    }
}

/// Write `text` to the child's stdin and close it so the synthesizer sees
/// EOF. A child that cannot take its text is killed and reaped before the
/// error is returned.
fn feed_text(child: &mut Child, text: &str) -> Result<(), SpeechError> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };
    if let Err(e) = stdin.write_all(text.as_bytes()) {
        drop(stdin);
        let _ = child.kill();
        let _ = child.wait();
        return Err(e.into());
    }
    Ok(())
}

fn synthesizer_args(utterance: &Utterance) -> Vec<String> {
    let mut args = vec![
        "-a".to_string(),
        amplitude(utterance.volume).to_string(),
        "-s".to_string(),
        words_per_minute(utterance.rate).to_string(),
    ];
    let voice = utterance
        .voice
        .as_ref()
        .map(|voice| voice.name.clone())
        .or_else(|| utterance.lang.clone());
    if let Some(voice) = voice {
        args.push("-v".to_string());
        args.push(voice);
    }
    args.push("--stdin".to_string());
    args
}

/// espeak amplitude runs 0..=200 with 100 as the normal level.
fn amplitude(volume: f32) -> u32 {
    (volume.clamp(0.0, 1.0) * 100.0).round() as u32
}

fn words_per_minute(rate: f32) -> u32 {
    (DEFAULT_WPM * rate).clamp(MIN_WPM, MAX_WPM).round() as u32
}

fn query_voices(program: &str) -> Result<Vec<Voice>, SpeechError> {
    let output = Command::new(program)
        .arg("--voices")
        .output()
        .map_err(|source| SpeechError::Spawn {
            program: program.to_string(),
            source,
        })?;
    Ok(parse_voice_listing(&String::from_utf8_lossy(&output.stdout)))
}

/// Parses the table printed by `espeak --voices`:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  af              --/M      Afrikaans          gmw/af
/// ```
fn parse_voice_listing(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            match columns.as_slice() {
                [_, lang, _, name, ..] => Some(Voice::new(*name, *lang)),
                _ => None,
            }
        })
        .collect()
}
