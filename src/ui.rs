use crate::capture::CaptureResult;
use std::fmt;

/// What the status line shows
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Listening,
    Matching,
    Running(String),
    Done(String),
    DidNotCatch,
    NoMatch,
    UnknownAction(String),
    Failed(String),
}

impl Phase {
    /// Phases that animate while waiting on something
    pub fn is_busy(&self) -> bool {
        matches!(self, Phase::Listening | Phase::Matching | Phase::Running(_))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Listening => write!(f, "listening"),
            Phase::Matching => write!(f, "matching"),
            Phase::Running(name) => write!(f, "running {}", name),
            Phase::Done(name) => write!(f, "done: {}", name),
            Phase::DidNotCatch => write!(f, "didn't catch that"),
            Phase::NoMatch => write!(f, "no matching command"),
            Phase::UnknownAction(_) => write!(f, "don't know how to do that"),
            Phase::Failed(msg) => write!(f, "error: {}", msg),
        }
    }
}

#[derive(Debug)]
pub enum UiEvent {
    Phase(Phase),
    /// A finished capture, posted from the worker thread
    Transcript(CaptureResult),
    /// Text that was heard, echoed above the status line
    Heard(String),
    Tick,
}

/// Cloneable handle onto the interactive queue
#[derive(Clone)]
pub struct Ui {
    tx: flume::Sender<UiEvent>,
}

impl Ui {
    pub fn new() -> (Self, flume::Receiver<UiEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }

    pub fn set_phase(&self, phase: Phase) {
        let _ = self.tx.send(UiEvent::Phase(phase));
    }

    pub fn deliver(&self, result: CaptureResult) {
        let _ = self.tx.send(UiEvent::Transcript(result));
    }

    pub fn show_heard(&self, text: &str) {
        let _ = self.tx.send(UiEvent::Heard(text.to_string()));
    }

    pub fn tick(&self) {
        let _ = self.tx.send(UiEvent::Tick);
    }
}
