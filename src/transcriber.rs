//! Parakeet speech-to-text (feature `parakeet`)
//!
//! Runs once per capture on the buffered utterance. The result is reduced to
//! a single line of words so trigger matching sees `say hello` rather than
//! `Say  hello.\n`; case is left to the matcher.

use std::path::Path;
use transcribe_rs::{
    TranscriptionEngine,
    engines::parakeet::{ParakeetEngine, ParakeetModelParams},
};

use crate::capture::{CaptureError, SAMPLE_RATE};
use crate::recognizer::SpeechToText;

/// Shorter than this and Parakeet tends to hallucinate a word
const MIN_SAMPLES: usize = SAMPLE_RATE / 10;

pub struct Transcriber {
    engine: ParakeetEngine,
}

impl Transcriber {
    /// Load the int8 Parakeet model directory
    pub fn new(model_path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(CaptureError::Recognition(format!(
                "model not found at {}",
                model_path.display()
            )));
        }

        let mut engine = ParakeetEngine::new();
        tracing::info!("Loading speech model from {}", model_path.display());
        engine
            .load_model_with_params(model_path, ParakeetModelParams::int8())
            .map_err(|e| {
                CaptureError::Recognition(format!("loading {}: {}", model_path.display(), e))
            })?;
        tracing::info!("Speech model loaded");
        Ok(Self { engine })
    }
}

impl SpeechToText for Transcriber {
    fn transcribe(&mut self, samples: &[f32]) -> Result<String, CaptureError> {
        if samples.len() < MIN_SAMPLES {
            return Ok(String::new());
        }
        let result = self
            .engine
            .transcribe_samples(samples.to_vec(), None)
            .map_err(|e| CaptureError::Recognition(e.to_string()))?;
        let text = clean_transcript(&result.text);
        tracing::debug!("Transcribed {} samples: {:?}", samples.len(), text);
        Ok(text)
    }
}

/// Collapse whitespace and drop trailing sentence punctuation
pub fn clean_transcript(raw: &str) -> String {
    let words: Vec<&str> = raw.split_whitespace().collect();
    words
        .join(" ")
        .trim_end_matches(['.', '!', '?', ','])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_transcript() {
        assert_eq!(clean_transcript("  Say  hello.\n"), "Say hello");
        assert_eq!(clean_transcript("open the browser?!"), "open the browser");
        assert_eq!(clean_transcript("Mr. Smith is here"), "Mr. Smith is here");
        assert_eq!(clean_transcript(" \n "), "");
    }

    #[test]
    fn test_missing_model_is_a_recognition_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("parakeet");
        assert!(matches!(
            Transcriber::new(&missing),
            Err(CaptureError::Recognition(msg)) if msg.contains("not found")
        ));
    }
}
