//! Narration lane - serialized speech output
//!
//! Narration engines are not reentrant, so a single lane thread owns the
//! narrator and renders one utterance at a time. `Speech::say` can be called
//! from any thread; it queues the text and blocks until that utterance has
//! been fully spoken.

use std::io::{self, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}")]
    Exit { program: String, status: ExitStatus },
    #[error("narration lane has stopped")]
    LaneStopped,
}

pub trait Narrator: Send {
    /// Render `text` audibly, returning once it has finished
    fn speak(&mut self, text: &str) -> Result<(), SpeechError>;

    fn name(&self) -> &'static str;
}

/// Prints narration to the terminal instead of speaking it
pub struct ConsoleNarrator;

impl Narrator for ConsoleNarrator {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        print!("\r\x1b[K\x1b[35m♪ {}\x1b[0m\r\n", text);
        io::stdout().flush().ok();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

/// Speaks through the platform's text-to-speech command
pub struct SystemVoice {
    program: String,
    args: Vec<String>,
}

impl SystemVoice {
    /// `say` on macOS, `espeak-ng` elsewhere
    pub fn platform_default() -> Self {
        #[cfg(target_os = "macos")]
        {
            Self::new("say", Vec::new())
        }
        #[cfg(target_os = "windows")]
        {
            Self::new(
                "powershell",
                vec![
                    "-NoProfile".into(),
                    "-Command".into(),
                    "Add-Type -AssemblyName System.Speech; \
                     (New-Object System.Speech.Synthesis.SpeechSynthesizer).Speak($args[0])"
                        .into(),
                ],
            )
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            Self::new("espeak-ng", Vec::new())
        }
    }

    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a configured command line; the text is appended as the last argument
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

impl Narrator for SystemVoice {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| SpeechError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !status.success() {
            return Err(SpeechError::Exit {
                program: self.program.clone(),
                status,
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

enum Request {
    Say { text: String, done: flume::Sender<()> },
    Stop,
}

/// Cloneable handle for queueing narration
#[derive(Clone)]
pub struct Speech {
    tx: flume::Sender<Request>,
    closed: Arc<Mutex<bool>>,
}

impl Speech {
    /// Speak `text`, blocking until it has been vocalized.
    /// Failures are logged; narration never interrupts the caller's flow.
    pub fn say(&self, text: impl Into<String>) {
        if let Err(e) = self.try_say(text) {
            tracing::warn!("Narration failed: {}", e);
        }
    }

    pub fn try_say(&self, text: impl Into<String>) -> Result<(), SpeechError> {
        let (done, finished) = flume::bounded(1);
        {
            // Queued under the lock so a stopping lane either sees it or refuses it
            let closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
            if *closed {
                return Err(SpeechError::LaneStopped);
            }
            self.tx
                .send(Request::Say {
                    text: text.into(),
                    done,
                })
                .map_err(|_| SpeechError::LaneStopped)?;
        }
        finished.recv().map_err(|_| SpeechError::LaneStopped)
    }
}

pub struct SpeechLane {
    speech: Speech,
    thread: Option<JoinHandle<()>>,
}

impl SpeechLane {
    pub fn spawn(mut narrator: Box<dyn Narrator>) -> io::Result<Self> {
        let (tx, rx) = flume::unbounded::<Request>();
        let closed = Arc::new(Mutex::new(false));
        tracing::debug!("Narration: {}", narrator.name());

        let lane_closed = Arc::clone(&closed);
        let thread = thread::Builder::new()
            .name("narration".into())
            .spawn(move || {
                while let Ok(request) = rx.recv() {
                    match request {
                        Request::Say { text, done } => {
                            if let Err(e) = narrator.speak(&text) {
                                tracing::warn!("Narrator '{}' failed: {}", narrator.name(), e);
                            }
                            let _ = done.send(());
                        }
                        Request::Stop => {
                            let mut closed =
                                lane_closed.lock().unwrap_or_else(PoisonError::into_inner);
                            *closed = true;
                            // Dropping each `done` sender wakes its caller with LaneStopped
                            let refused = rx.try_iter().count();
                            if refused > 0 {
                                tracing::debug!("Narration stopped with {} requests queued", refused);
                            }
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            speech: Speech { tx, closed },
            thread: Some(thread),
        })
    }

    pub fn speech(&self) -> Speech {
        self.speech.clone()
    }

    /// Finish utterances queued so far, then stop the lane.
    /// Anything queued after this fails with `LaneStopped`.
    pub fn shutdown(mut self) {
        let _ = self.speech.tx.send(Request::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
