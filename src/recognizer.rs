//! Recognizer built from an endpointer and a batch speech-to-text engine
//!
//! Chunks are buffered while the endpointer watches for the end of the
//! utterance. The engine only runs once, on the buffered audio, when the
//! worker asks for the final result. If no speech was heard the transcript
//! is empty and the engine is skipped.

use crate::audio::i16_to_f32;
use crate::capture::{CaptureError, Recognizer};
use crate::endpoint::Endpointer;

/// Batch transcription of mono 16 kHz audio
pub trait SpeechToText: Send {
    fn transcribe(&mut self, samples: &[f32]) -> Result<String, CaptureError>;
}

pub struct VadRecognizer<S> {
    endpointer: Endpointer,
    engine: S,
    buffer: Vec<f32>,
}

impl<S: SpeechToText> VadRecognizer<S> {
    pub fn new(endpointer: Endpointer, engine: S) -> Self {
        tracing::debug!("Recognizer using {} VAD", endpointer.vad_name());
        Self {
            endpointer,
            engine,
            buffer: Vec::new(),
        }
    }
}

impl<S: SpeechToText> Recognizer for VadRecognizer<S> {
    fn reset(&mut self) {
        self.endpointer.reset();
        self.buffer.clear();
    }

    fn accept_chunk(&mut self, chunk: &[i16]) -> Result<bool, CaptureError> {
        let samples = i16_to_f32(chunk);
        self.buffer.extend_from_slice(&samples);
        Ok(self.endpointer.push(&samples))
    }

    fn final_result(&mut self) -> Result<String, CaptureError> {
        if !self.endpointer.heard_speech() {
            tracing::debug!("No speech detected");
            return Ok(String::new());
        }
        let samples = std::mem::take(&mut self.buffer);
        let text = self.engine.transcribe(&samples)?;
        tracing::debug!("Transcribed {} samples: {:?}", samples.len(), text);
        Ok(text)
    }
}
