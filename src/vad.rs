//! Voice activity detection for the capture endpointer
//!
//! Silero runs when the `parakeet` feature is built and its model file is
//! present. The energy detector needs no model and is always available.

#[cfg(feature = "parakeet")]
use crate::capture::CaptureError;
#[cfg(feature = "parakeet")]
use vad_rs::Vad;

#[cfg(feature = "parakeet")]
const VAD_THRESHOLD: f32 = 0.3;
#[cfg(feature = "parakeet")]
const VAD_THRESHOLD_END: f32 = 0.25;
const ENERGY_THRESHOLD: f32 = 0.01;
const ENERGY_THRESHOLD_END: f32 = 0.006;

pub enum VadEngine {
    #[cfg(feature = "parakeet")]
    Silero(Vad),
    Energy,
}

impl VadEngine {
    #[cfg(feature = "parakeet")]
    pub fn silero(model_path: &str, sample_rate: usize) -> Result<Self, CaptureError> {
        let vad = Vad::new(model_path, sample_rate).map_err(|e| {
            CaptureError::Recognition(format!("Silero VAD {}: {}", model_path, e))
        })?;
        Ok(VadEngine::Silero(vad))
    }

    pub fn energy() -> Self {
        VadEngine::Energy
    }

    /// Pick Silero when the model is present, energy-based otherwise
    #[cfg_attr(not(feature = "parakeet"), allow(unused_variables))]
    pub fn from_model(model_path: Option<&str>, sample_rate: usize) -> Self {
        #[cfg(feature = "parakeet")]
        if let Some(path) = model_path.filter(|p| std::path::Path::new(p).exists()) {
            match Self::silero(path, sample_rate) {
                Ok(v) => return v,
                Err(e) => tracing::warn!("{}; using energy-based VAD", e),
            }
        }
        Self::energy()
    }

    /// Classify one 30 ms frame. The threshold drops once speech has started
    /// so trailing syllables are not cut off.
    pub fn is_speech(&mut self, frame: &[f32], currently_speaking: bool) -> bool {
        match self {
            #[cfg(feature = "parakeet")]
            VadEngine::Silero(vad) => {
                let threshold = if currently_speaking {
                    VAD_THRESHOLD_END
                } else {
                    VAD_THRESHOLD
                };
                vad.compute(frame)
                    .map(|r| r.prob > threshold)
                    .unwrap_or(false)
            }
            VadEngine::Energy => {
                let threshold = if currently_speaking {
                    ENERGY_THRESHOLD_END
                } else {
                    ENERGY_THRESHOLD
                };
                rms(frame) > threshold
            }
        }
    }

    pub fn reset(&mut self) {
        #[cfg(feature = "parakeet")]
        if let VadEngine::Silero(vad) = self {
            vad.reset();
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "parakeet")]
            VadEngine::Silero(_) => "Silero",
            VadEngine::Energy => "Energy",
        }
    }
}

pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|&s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_thresholds() {
        let mut vad = VadEngine::energy();
        let quiet = vec![0.0f32; 480];
        let loud = vec![0.2f32; 480];
        let trailing = vec![0.008f32; 480];

        assert!(!vad.is_speech(&quiet, false));
        assert!(vad.is_speech(&loud, false));
        // Lower threshold once speech has started
        assert!(!vad.is_speech(&trailing, false));
        assert!(vad.is_speech(&trailing, true));
    }

    #[test]
    fn test_missing_model_falls_back() {
        let vad = VadEngine::from_model(Some("models/does-not-exist.onnx"), 16000);
        assert_eq!(vad.name(), "Energy");
    }

    #[cfg(feature = "parakeet")]
    #[test]
    fn test_corrupt_model_is_a_recognition_error() {
        let mut model = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut model, b"not an onnx model").unwrap();
        let path = model.path().to_str().unwrap();

        assert!(matches!(
            VadEngine::silero(path, 16000),
            Err(CaptureError::Recognition(_))
        ));
        assert_eq!(VadEngine::from_model(Some(path), 16000).name(), "Energy");
    }
}
