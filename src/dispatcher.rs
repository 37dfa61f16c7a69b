//! Dispatcher - one listen/recognize/match/execute cycle
//!
//! `begin_listening` queues a capture job. The capture result comes back
//! through the `Ui` queue as `UiEvent::Transcript` and is fed to
//! `handle_capture`. Both narrate and block, so the interactive loop forwards
//! them as `Gesture`s to `serve` running on a single blocking thread.

use crate::capture::{CaptureError, CaptureHandle, CaptureResult};
use crate::executor::{Execution, Executor};
use crate::matcher::Matcher;
use crate::speech::Speech;
use crate::ui::{Phase, Ui};

pub const LISTENING_MESSAGE: &str = "Listening.";
pub const NOT_CAUGHT_MESSAGE: &str = "Sorry, I didn't catch that.";
pub const NO_MATCH_MESSAGE: &str = "I didn't understand that command.";
pub const MICROPHONE_MESSAGE: &str = "I couldn't use the microphone.";
pub const RECOGNITION_MESSAGE: &str = "Speech recognition failed.";

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no capture worker is attached")]
    NoCaptureWorker,
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Work for the dispatcher, handled strictly in arrival order
#[derive(Debug)]
pub enum Gesture {
    /// The user asked to be heard
    Listen,
    /// The capture worker finished a job
    Captured(CaptureResult),
}

#[derive(Debug)]
pub enum Outcome {
    /// Transcript was empty
    NotUnderstood,
    NoMatch,
    Executed { name: String, execution: Execution },
    CaptureFailed(CaptureError),
}

pub struct Dispatcher {
    matcher: Matcher,
    executor: Executor,
    speech: Speech,
    ui: Ui,
    capture: Option<CaptureHandle>,
}

impl Dispatcher {
    pub fn new(matcher: Matcher, executor: Executor, speech: Speech, ui: Ui) -> Self {
        Self {
            matcher,
            executor,
            speech,
            ui,
            capture: None,
        }
    }

    pub fn with_capture(mut self, capture: CaptureHandle) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Announce and queue one capture job; the result is posted to the UI queue
    pub fn begin_listening(&self) -> Result<(), DispatchError> {
        let capture = self.capture.as_ref().ok_or(DispatchError::NoCaptureWorker)?;

        self.ui.set_phase(Phase::Listening);
        self.speech.say(LISTENING_MESSAGE);

        let ui = self.ui.clone();
        if let Err(e) = capture.listen(move |result| ui.deliver(result)) {
            self.ui.set_phase(Phase::Failed(e.to_string()));
            return Err(e.into());
        }
        Ok(())
    }

    /// Handle gestures one at a time until every sender is dropped, so two
    /// cycles never match or narrate concurrently
    pub fn serve(&self, gestures: flume::Receiver<Gesture>) {
        for gesture in gestures.iter() {
            match gesture {
                Gesture::Listen => {
                    if let Err(e) = self.begin_listening() {
                        tracing::error!("Could not start listening: {}", e);
                    }
                }
                Gesture::Captured(result) => {
                    if let Outcome::Executed { name, execution } = self.handle_capture(result) {
                        tracing::debug!("{}: {:?}", name, execution);
                    }
                }
            }
        }
        tracing::debug!("Dispatcher stopped");
    }

    pub fn handle_capture(&self, result: CaptureResult) -> Outcome {
        match result {
            Ok(text) => self.handle_transcript(&text),
            Err(e) => {
                tracing::error!("Capture failed: {}", e);
                let message = match e {
                    CaptureError::Recognition(_) => RECOGNITION_MESSAGE,
                    _ => MICROPHONE_MESSAGE,
                };
                self.ui.set_phase(Phase::Failed(e.to_string()));
                self.speech.say(message);
                Outcome::CaptureFailed(e)
            }
        }
    }

    pub fn handle_transcript(&self, text: &str) -> Outcome {
        let text = text.trim();
        if text.is_empty() {
            tracing::info!("Empty transcript");
            self.ui.set_phase(Phase::DidNotCatch);
            self.speech.say(NOT_CAUGHT_MESSAGE);
            return Outcome::NotUnderstood;
        }

        self.ui.show_heard(text);
        self.ui.set_phase(Phase::Matching);

        let Some(m) = self.matcher.resolve_with_trigger(text) else {
            tracing::info!("No command matches {:?}", text);
            self.ui.set_phase(Phase::NoMatch);
            self.speech.say(NO_MATCH_MESSAGE);
            return Outcome::NoMatch;
        };
        let def = m.action;
        tracing::info!("{:?} matched '{}' via {:?}", text, def.name, m.trigger);

        self.ui.set_phase(Phase::Running(def.name.clone()));
        self.speech.say(format!("Running {}.", def.name));

        let execution = self.executor.execute(def);
        self.ui.set_phase(match &execution {
            Execution::Completed | Execution::FellBack { .. } => Phase::Done(def.name.clone()),
            Execution::UnknownAction => Phase::UnknownAction(def.action.clone()),
            Execution::Rejected { .. } => Phase::Failed("parameters don't fit".into()),
            Execution::Failed(e) => Phase::Failed(e.to_string()),
        });

        Outcome::Executed {
            name: def.name.clone(),
            execution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{HandlerTable, from_fn};
    use crate::registry::{Params, Registry};
    use crate::speech::{Narrator, SpeechError, SpeechLane};
    use crate::ui::UiEvent;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Narrator for Recorder {
        fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    const RULES: &str = r#"{
        "commands": [
            { "name": "say_hello", "triggers": ["say hello"], "action": "greet", "params": {} },
            { "name": "teleport", "triggers": ["beam me up"], "action": "teleport" }
        ]
    }"#;

    struct Fixture {
        dispatcher: Dispatcher,
        events: flume::Receiver<UiEvent>,
        spoken: Arc<Mutex<Vec<String>>>,
        greeted: Arc<Mutex<usize>>,
        _lane: SpeechLane,
    }

    fn fixture() -> Fixture {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let lane = SpeechLane::spawn(Box::new(Recorder(Arc::clone(&spoken)))).unwrap();
        let greeted = Arc::new(Mutex::new(0));

        let mut table = HandlerTable::new();
        let count = Arc::clone(&greeted);
        table.register(
            "greet",
            from_fn(move |_: Option<Params>| {
                *count.lock().unwrap() += 1;
                Ok(())
            }),
        );

        let registry = Arc::new(Registry::from_json(RULES).unwrap());
        let (ui, events) = Ui::new();
        let dispatcher = Dispatcher::new(
            Matcher::new(registry),
            Executor::new(table, lane.speech()),
            lane.speech(),
            ui,
        );
        Fixture {
            dispatcher,
            events,
            spoken,
            greeted,
            _lane: lane,
        }
    }

    impl Fixture {
        fn phases(&self) -> Vec<Phase> {
            self.events
                .drain()
                .filter_map(|e| match e {
                    UiEvent::Phase(p) => Some(p),
                    _ => None,
                })
                .collect()
        }

        fn spoken(&self) -> Vec<String> {
            self.spoken.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_say_hello_runs_handler() {
        let fx = fixture();
        let outcome = fx.dispatcher.handle_transcript("Please SAY HELLO now");
        assert!(matches!(
            outcome,
            Outcome::Executed { ref name, execution: Execution::Completed } if name == "say_hello"
        ));
        assert_eq!(*fx.greeted.lock().unwrap(), 1);
        assert_eq!(fx.spoken(), ["Running say_hello."]);
        assert_eq!(
            fx.phases(),
            [
                Phase::Matching,
                Phase::Running("say_hello".into()),
                Phase::Done("say_hello".into())
            ]
        );
    }

    #[test]
    fn test_empty_transcript_runs_nothing() {
        let fx = fixture();
        for text in ["", "   "] {
            assert!(matches!(fx.dispatcher.handle_transcript(text), Outcome::NotUnderstood));
        }
        assert_eq!(*fx.greeted.lock().unwrap(), 0);
        assert_eq!(fx.spoken(), [NOT_CAUGHT_MESSAGE, NOT_CAUGHT_MESSAGE]);
        assert_eq!(fx.phases(), [Phase::DidNotCatch, Phase::DidNotCatch]);
    }

    #[test]
    fn test_no_match_is_narrated() {
        let fx = fixture();
        assert!(matches!(
            fx.dispatcher.handle_transcript("what's the weather"),
            Outcome::NoMatch
        ));
        assert_eq!(*fx.greeted.lock().unwrap(), 0);
        assert_eq!(fx.spoken(), [NO_MATCH_MESSAGE]);
        assert_eq!(fx.phases(), [Phase::Matching, Phase::NoMatch]);
    }

    #[test]
    fn test_unknown_action_sets_phase() {
        let fx = fixture();
        let outcome = fx.dispatcher.handle_transcript("beam me up");
        assert!(matches!(
            outcome,
            Outcome::Executed { execution: Execution::UnknownAction, .. }
        ));
        assert_eq!(
            fx.phases().last(),
            Some(&Phase::UnknownAction("teleport".into()))
        );
    }

    #[test]
    fn test_capture_failure_is_narrated() {
        let fx = fixture();
        let outcome = fx
            .dispatcher
            .handle_capture(Err(CaptureError::MicrophoneUnavailable("busy".into())));
        assert!(matches!(outcome, Outcome::CaptureFailed(_)));
        let outcome = fx
            .dispatcher
            .handle_capture(Err(CaptureError::Recognition("model".into())));
        assert!(matches!(outcome, Outcome::CaptureFailed(_)));
        assert_eq!(fx.spoken(), [MICROPHONE_MESSAGE, RECOGNITION_MESSAGE]);
        assert_eq!(*fx.greeted.lock().unwrap(), 0);
    }

    #[test]
    fn test_begin_listening_without_worker() {
        let fx = fixture();
        assert!(matches!(
            fx.dispatcher.begin_listening(),
            Err(DispatchError::NoCaptureWorker)
        ));
        assert!(fx.spoken().is_empty());
    }

    #[test]
    fn test_serve_handles_gestures_in_order() {
        let fx = fixture();
        let (tx, rx) = flume::unbounded();
        tx.send(Gesture::Captured(Ok("say hello".into()))).unwrap();
        tx.send(Gesture::Captured(Ok("what's the weather".into()))).unwrap();
        tx.send(Gesture::Listen).unwrap();
        tx.send(Gesture::Captured(Ok(String::new()))).unwrap();
        drop(tx);

        std::thread::scope(|s| {
            s.spawn(|| fx.dispatcher.serve(rx));
        });

        assert_eq!(
            fx.spoken(),
            ["Running say_hello.", NO_MATCH_MESSAGE, NOT_CAUGHT_MESSAGE]
        );
        assert_eq!(
            fx.phases(),
            [
                Phase::Matching,
                Phase::Running("say_hello".into()),
                Phase::Done("say_hello".into()),
                Phase::Matching,
                Phase::NoMatch,
                Phase::DidNotCatch
            ]
        );
    }
}
