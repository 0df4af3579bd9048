//! Spoken readout of answers.
//!
//! Speech stays locked until the first user interaction. Each utterance
//! cancels whatever is playing or pending, then is scheduled on a one-shot
//! timer: some TTS engines drop an utterance issued right after a cancel.

use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::VoiceConfig;
use crate::error::VoiceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    /// BCP 47-ish tag, e.g. `fr-fr`.
    pub lang: String,
}

/// Platform TTS capability.
pub trait SpeechBackend: Send + Sync {
    /// Currently installed voices. May be empty while the engine warms up.
    fn voices(&self) -> Vec<Voice>;
    /// Stop the current utterance, if any.
    fn cancel(&self);
    fn speak(&self, text: &str, voice: &Voice);
}

#[derive(Debug, PartialEq, Eq)]
pub enum VoiceList {
    Found(Vec<Voice>),
    TimedOut,
}

/// Poll the backend until it reports at least one voice or `ceiling` elapses.
///
/// Each lookup runs on the blocking pool, so a slow engine cannot hold the
/// caller past `ceiling`.
pub async fn wait_for_voices(
    backend: Arc<dyn SpeechBackend>,
    interval: Duration,
    ceiling: Duration,
) -> VoiceList {
    let poll = async {
        loop {
            let lookup = backend.clone();
            match tokio::task::spawn_blocking(move || lookup.voices()).await {
                Ok(voices) if !voices.is_empty() => return voices,
                Ok(_) => {}
                Err(e) => warn!("Voice lookup task failed: {e}"),
            }
            tokio::time::sleep(interval).await;
        }
    };
    match tokio::time::timeout(ceiling, poll).await {
        Ok(voices) => VoiceList::Found(voices),
        Err(_) => VoiceList::TimedOut,
    }
}

/// First voice tagged with `prefix`, otherwise the first voice at all.
pub fn pick_voice<'a>(voices: &'a [Voice], prefix: &str) -> Option<&'a Voice> {
    voices
        .iter()
        .find(|v| v.lang.starts_with(prefix))
        .or_else(|| voices.first())
}

pub struct VoiceOutput {
    backend: Arc<dyn SpeechBackend>,
    language_prefix: String,
    poll_interval: Duration,
    poll_timeout: Duration,
    speak_delay: Duration,
    welcome_delay: Duration,
    welcome_text: String,
    unlocked: AtomicBool,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl VoiceOutput {
    pub fn new(backend: Arc<dyn SpeechBackend>, config: &VoiceConfig) -> Self {
        Self {
            backend,
            language_prefix: config.language_prefix.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
            speak_delay: Duration::from_millis(config.speak_delay_ms),
            welcome_delay: Duration::from_millis(config.welcome_delay_ms),
            welcome_text: config.welcome_text.clone(),
            unlocked: AtomicBool::new(false),
            pending: Mutex::new(None),
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::Relaxed)
    }

    /// Unlock speech and play the welcome line.
    ///
    /// Returns `Ok(false)` if speech was already unlocked. Stays locked when
    /// no voice can be found, so the user can retry.
    pub async fn unlock(&self) -> Result<bool, VoiceError> {
        if self.is_unlocked() {
            return Ok(false);
        }
        let voice = self.resolve_voice().await?;
        self.schedule(self.welcome_text.clone(), voice, self.welcome_delay);
        self.unlocked.store(true, Ordering::Relaxed);
        info!("Voice output unlocked");
        Ok(true)
    }

    /// Read `text` aloud, replacing anything currently playing.
    pub async fn speak(&self, text: &str) -> Result<(), VoiceError> {
        let voice = self.resolve_voice().await?;
        self.schedule(text.to_string(), voice, self.speak_delay);
        Ok(())
    }

    /// Cancel the playing utterance and any scheduled one.
    pub fn cancel(&self) {
        if let Some(handle) = self.pending.lock().unwrap().take() {
            handle.abort();
        }
        self.backend.cancel();
    }

    /// Wait until the scheduled utterance, if any, has been handed to the backend.
    pub async fn flush(&self) {
        let handle = self.pending.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn resolve_voice(&self) -> Result<Voice, VoiceError> {
        let voices = match wait_for_voices(
            self.backend.clone(),
            self.poll_interval,
            self.poll_timeout,
        )
        .await
        {
            VoiceList::Found(voices) => voices,
            VoiceList::TimedOut => {
                warn!("No voice became available within {:?}", self.poll_timeout);
                return Err(VoiceError::NoVoiceAvailable);
            }
        };
        pick_voice(&voices, &self.language_prefix)
            .cloned()
            .ok_or(VoiceError::NoVoiceAvailable)
    }

    fn schedule(&self, text: String, voice: Voice, delay: Duration) {
        self.cancel();

        let backend = self.backend.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!("Speaking with voice {} ({})", voice.name, voice.lang);
            backend.speak(&text, &voice);
        });

        *self.pending.lock().unwrap() = Some(handle);
    }
}

/// Speech through an espeak-compatible command line tool.
pub struct CommandSpeech {
    program: String,
    child: Mutex<Option<Child>>,
}

impl CommandSpeech {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            child: Mutex::new(None),
        }
    }

    /// `--` keeps answers that start with a dash from being read as options.
    fn speak_command(&self, text: &str, voice: &Voice) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-v").arg(&voice.lang).arg("--").arg(text);
        cmd
    }
}

impl SpeechBackend for CommandSpeech {
    fn voices(&self) -> Vec<Voice> {
        match Command::new(&self.program).arg("--voices").output() {
            Ok(out) if out.status.success() => {
                parse_voice_list(&String::from_utf8_lossy(&out.stdout))
            }
            Ok(out) => {
                debug!("{} --voices exited with {}", self.program, out.status);
                Vec::new()
            }
            Err(e) => {
                debug!("Cannot run {}: {e}", self.program);
                Vec::new()
            }
        }
    }

    fn cancel(&self) {
        if let Some(mut child) = self.child.lock().unwrap().take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn speak(&self, text: &str, voice: &Voice) {
        let spawned = self
            .speak_command(text, voice)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => {
                if let Some(mut previous) = self.child.lock().unwrap().replace(child) {
                    let _ = previous.kill();
                    let _ = previous.wait();
                }
            }
            Err(e) => warn!("Failed to start {}: {e}", self.program),
        }
    }
}

/// Parse `espeak-ng --voices` output.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  fr-fr           --/M      French             roa/fr
/// ```
fn parse_voice_list(output: &str) -> Vec<Voice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            Some(Voice {
                name: fields[3].to_string(),
                lang: fields[1].to_string(),
            })
        })
        .collect()
}
