//! End-of-speech detection over a stream of 16 kHz samples
//!
//! Audio is cut into 30 ms frames and classified by the VAD. Speech has to
//! persist for a few frames before it counts, and an utterance ends after
//! enough trailing silence. Bursts shorter than half a second are discarded
//! as noise.

use crate::capture::SAMPLE_RATE;
use crate::vad::VadEngine;

// 30ms frames at 16kHz
pub const FRAME_SAMPLES: usize = 480;
const MIN_SPEECH_SAMPLES: usize = SAMPLE_RATE / 2;
const SILENCE_FRAMES_TO_END: usize = 15;
const ONSET_FRAMES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
enum VadState {
    Idle,
    Onset(usize),
    Speaking { silence: usize, samples: usize },
    Finished,
}

pub struct Endpointer {
    vad: VadEngine,
    state: VadState,
    pending: Vec<f32>,
    heard_speech: bool,
}

impl Endpointer {
    pub fn new(vad: VadEngine) -> Self {
        Self {
            vad,
            state: VadState::Idle,
            pending: Vec::with_capacity(FRAME_SAMPLES),
            heard_speech: false,
        }
    }

    pub fn reset(&mut self) {
        self.vad.reset();
        self.state = VadState::Idle;
        self.pending.clear();
        self.heard_speech = false;
    }

    /// True once a complete utterance has been heard
    pub fn is_finished(&self) -> bool {
        self.state == VadState::Finished
    }

    /// Whether any utterance long enough to transcribe was detected
    pub fn heard_speech(&self) -> bool {
        self.heard_speech
    }

    pub fn vad_name(&self) -> &'static str {
        self.vad.name()
    }

    /// Feed samples; returns true once the utterance is finalized
    pub fn push(&mut self, samples: &[f32]) -> bool {
        if self.is_finished() {
            return true;
        }
        self.pending.extend_from_slice(samples);

        while self.pending.len() >= FRAME_SAMPLES {
            let frame: Vec<f32> = self.pending.drain(..FRAME_SAMPLES).collect();
            self.process_frame(&frame);
            if self.is_finished() {
                self.pending.clear();
                return true;
            }
        }
        false
    }

    fn process_frame(&mut self, frame: &[f32]) {
        let is_speaking = matches!(self.state, VadState::Speaking { .. });
        let is_speech = self.vad.is_speech(frame, is_speaking);

        self.state = match self.state {
            VadState::Idle if is_speech => VadState::Onset(1),
            VadState::Idle => VadState::Idle,
            VadState::Onset(count) if is_speech => {
                if count + 1 >= ONSET_FRAMES {
                    VadState::Speaking {
                        silence: 0,
                        samples: (count + 1) * FRAME_SAMPLES,
                    }
                } else {
                    VadState::Onset(count + 1)
                }
            }
            VadState::Onset(_) => VadState::Idle,
            VadState::Speaking { silence, samples } => {
                let silence = if is_speech { 0 } else { silence + 1 };
                let samples = samples + FRAME_SAMPLES;
                if silence < SILENCE_FRAMES_TO_END {
                    VadState::Speaking { silence, samples }
                } else if samples - silence * FRAME_SAMPLES >= MIN_SPEECH_SAMPLES {
                    self.heard_speech = true;
                    VadState::Finished
                } else {
                    tracing::trace!("Discarding {} samples of noise", samples);
                    VadState::Idle
                }
            }
            VadState::Finished => VadState::Finished,
        };

        // Long enough to transcribe even if the ceiling cuts it off
        if let VadState::Speaking { silence, samples } = self.state {
            if samples - silence * FRAME_SAMPLES >= MIN_SPEECH_SAMPLES {
                self.heard_speech = true;
            }
        }
    }
}
