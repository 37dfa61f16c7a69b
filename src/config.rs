use crate::automation::InputMethod;
use crate::capture::CaptureSettings;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_name")]
    pub name: String,
    /// Rule file with the voice commands
    #[serde(default = "default_commands")]
    pub commands: PathBuf,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            commands: default_commands(),
            capture: CaptureConfig::default(),
            speech: SpeechConfig::default(),
            dispatch: DispatchConfig::default(),
            automation: AutomationConfig::default(),
        }
    }
}

fn default_name() -> String {
    "Camcookie".to_string()
}

fn default_commands() -> PathBuf {
    PathBuf::from("commands.json")
}

// ============================================================================
// Capture Config
// ============================================================================

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VadKind {
    /// Silero model, falls back to energy when the model is missing
    #[default]
    Silero,
    /// RMS threshold
    Energy,
}

#[derive(Debug, Deserialize)]
pub struct CaptureConfig {
    /// Longest a single capture may run
    #[serde(default = "default_max_seconds")]
    pub max_seconds: f32,
    /// Samples per chunk handed to the recognizer (16 kHz mono)
    #[serde(default = "default_chunk_samples")]
    pub chunk_samples: usize,
    #[serde(default)]
    pub vad: VadKind,
    #[serde(default = "default_vad_model")]
    pub vad_model: String,
    /// Parakeet model directory
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_seconds: default_max_seconds(),
            chunk_samples: default_chunk_samples(),
            vad: VadKind::default(),
            vad_model: default_vad_model(),
            model: default_model(),
        }
    }
}

impl CaptureConfig {
    pub fn settings(&self) -> CaptureSettings {
        let defaults = CaptureSettings::default();
        let max_duration = Duration::try_from_secs_f32(self.max_seconds)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(defaults.max_duration);
        CaptureSettings {
            max_duration,
            chunk_samples: if self.chunk_samples == 0 {
                defaults.chunk_samples
            } else {
                self.chunk_samples
            },
        }
    }

    /// VAD model to try, if any
    pub fn vad_model_path(&self) -> Option<&str> {
        match self.vad {
            VadKind::Silero => Some(self.vad_model.as_str()),
            VadKind::Energy => None,
        }
    }
}

fn default_max_seconds() -> f32 {
    5.0
}

fn default_chunk_samples() -> usize {
    crate::capture::DEFAULT_CHUNK_SAMPLES
}

fn default_vad_model() -> String {
    "models/silero_vad_v4.onnx".to_string()
}

fn default_model() -> String {
    "models/parakeet-tdt-0.6b-v3-int8".to_string()
}

// ============================================================================
// Speech Config
// ============================================================================

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeechEngine {
    /// Print narration to the terminal
    Console,
    /// Platform text-to-speech command
    #[default]
    System,
}

#[derive(Debug, Deserialize, Default)]
pub struct SpeechConfig {
    #[serde(default)]
    pub engine: SpeechEngine,
    /// Overrides the platform command, e.g. ["espeak-ng", "-s", "160"]
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

// ============================================================================
// Dispatch / Automation Config
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct DispatchConfig {
    /// Refuse to run a handler whose params don't fit instead of calling it bare
    #[serde(default)]
    pub strict_params: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct AutomationConfig {
    /// "direct" or "clipboard"
    #[serde(default)]
    pub input_method: InputMethod,
}

impl Config {
    /// Missing file gives defaults; an unreadable or invalid one is warned about
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No {}, using defaults", path.display());
                return Config::default();
            }
            Err(e) => {
                tracing::warn!("Could not read {}: {}; using defaults", path.display(), e);
                return Config::default();
            }
        };
        Self::parse(&text).unwrap_or_else(|e| {
            tracing::warn!("Invalid {}: {}; using defaults", path.display(), e);
            Config::default()
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
