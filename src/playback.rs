//! Read-aloud of answers on a background thread.
//!
//! At most one playback is alive. Starting a new one first stops the
//! current playback and waits for its thread to finish.

use std::{
    process::{Command, Stdio},
    sync::Arc,
    thread::JoinHandle,
    time::Duration,
};

use tracing::{debug, warn};

use crate::{
    cancel::CancellationFlag,
    error::{Error, Result},
};

pub const TTS_COMMAND_ENV_VAR: &str = "PDFCHAT_TTS_COMMAND";
pub const DEFAULT_TTS_COMMAND: &str = "espeak";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Something that can speak text aloud.
pub trait Speaker: Send + Sync + 'static {
    /// Speak `text`, returning early once `stop` is raised.
    fn speak(&self, text: &str, stop: &CancellationFlag) -> Result<()>;
}

/// Speaks by running an external text-to-speech program with the text as
/// its last argument.
#[derive(Debug, Clone)]
pub struct CommandSpeaker {
    program: String,
    args: Vec<String>,
}

impl CommandSpeaker {
    /// Parse a command line such as `espeak -s 150`.
    pub fn new(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("empty text-to-speech command".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// The command from `PDFCHAT_TTS_COMMAND`, or `espeak`.
    pub fn from_env() -> Result<Self> {
        let command = std::env::var(TTS_COMMAND_ENV_VAR)
            .unwrap_or_else(|_| DEFAULT_TTS_COMMAND.to_string());
        Self::new(&command)
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Speaker for CommandSpeaker {
    fn speak(&self, text: &str, stop: &CancellationFlag) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        loop {
            if child.try_wait()?.is_some() {
                return Ok(());
            }
            if stop.is_cancelled() {
                debug!("stopping speech");
                // The child may have exited between the two checks.
                let _ = child.kill();
                child.wait()?;
                return Ok(());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

struct Playback {
    stop: CancellationFlag,
    handle: JoinHandle<()>,
}

/// Owns the single read-aloud thread.
pub struct PlaybackManager<S: Speaker> {
    speaker: Arc<S>,
    current: Option<Playback>,
    linked: Option<CancellationFlag>,
}

impl<S: Speaker> PlaybackManager<S> {
    pub fn new(speaker: S) -> Self {
        Self {
            speaker: Arc::new(speaker),
            current: None,
            linked: None,
        }
    }

    /// Also raise `flag` whenever playback is stopped by the user.
    pub fn link_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.linked = Some(flag);
        self
    }

    /// Speak `text`, stopping and joining any playback in progress first.
    pub fn start(&mut self, text: impl Into<String>) {
        self.halt_current();

        let text = text.into();
        let stop = CancellationFlag::new();
        let speaker = Arc::clone(&self.speaker);
        let thread_stop = stop.clone();
        let handle = std::thread::spawn(move || {
            if let Err(e) = speaker.speak(&text, &thread_stop) {
                warn!(error = %e, "read-aloud failed");
            }
        });

        self.current = Some(Playback { stop, handle });
    }

    /// Stop playback, wait for it to end, and raise the linked flag.
    pub fn stop(&mut self) {
        self.halt_current();
        if let Some(flag) = &self.linked {
            flag.cancel();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|p| !p.handle.is_finished())
    }

    /// Block until the current playback ends on its own.
    pub fn wait(&mut self) {
        if let Some(playback) = self.current.take()
            && playback.handle.join().is_err()
        {
            warn!("read-aloud thread panicked");
        }
    }

    fn halt_current(&mut self) {
        if let Some(playback) = self.current.take() {
            playback.stop.cancel();
            if playback.handle.join().is_err() {
                warn!("read-aloud thread panicked");
            }
        }
    }
}

impl<S: Speaker> Drop for PlaybackManager<S> {
    fn drop(&mut self) {
        self.halt_current();
    }
}
