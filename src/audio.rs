//! Microphone input and sample format conversion
//!
//! The recognizer expects mono 16 kHz 16-bit audio. Devices rarely deliver
//! that, so the cpal callback downmixes, resamples and quantizes before
//! handing samples to the capture worker.

use crate::capture::{CaptureError, SAMPLE_RATE};
use rubato::{FftFixedIn, Resampler};

pub fn to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        data.to_vec()
    } else {
        data.chunks(channels)
            .map(|c| c.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / i16::MAX as f32).collect()
}

const RESAMPLE_CHUNK: usize = 1024;

/// Converts device callback buffers to recognizer format.
///
/// Resampling state carries across callbacks: input is buffered until the
/// resampler has a full chunk, so no samples are lost at buffer edges.
pub struct RecognizerFormat {
    channels: usize,
    resampler: Option<FftFixedIn<f32>>,
    in_buf: Vec<f32>,
}

impl RecognizerFormat {
    pub fn new(channels: usize, input_rate: usize) -> Result<Self, CaptureError> {
        let resampler = if input_rate == SAMPLE_RATE {
            None
        } else {
            let resampler = FftFixedIn::<f32>::new(input_rate, SAMPLE_RATE, RESAMPLE_CHUNK, 1, 1)
                .map_err(|e| {
                    CaptureError::Device(format!("cannot resample {}Hz: {}", input_rate, e))
                })?;
            Some(resampler)
        };
        Ok(Self {
            channels: channels.max(1),
            resampler,
            in_buf: Vec::with_capacity(RESAMPLE_CHUNK * 2),
        })
    }

    /// Convert one callback buffer; may return fewer samples than a full
    /// conversion while input waits for the next chunk
    pub fn push(&mut self, data: &[f32]) -> Vec<i16> {
        let mono = to_mono(data, self.channels);
        let Some(resampler) = self.resampler.as_mut() else {
            return f32_to_i16(&mono);
        };

        self.in_buf.extend_from_slice(&mono);
        let mut out = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.in_buf.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.in_buf.drain(..needed).collect();
            match resampler.process(&[&chunk], None) {
                Ok(frames) => out.extend(f32_to_i16(&frames[0])),
                Err(e) => tracing::warn!("Resampling failed: {}", e),
            }
        }
        out
    }
}

#[cfg(feature = "audio")]
pub use cpal_input::CpalMicrophone;

#[cfg(feature = "audio")]
mod cpal_input {
    use super::RecognizerFormat;
    use crate::capture::{AudioStream, CaptureError, Microphone};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::collections::VecDeque;
    use std::time::Duration;

    const READ_TIMEOUT: Duration = Duration::from_secs(2);

    /// Default system input device. The device is opened per capture job and
    /// closed when the job's stream is dropped.
    #[derive(Default)]
    pub struct CpalMicrophone;

    struct CpalStream {
        _stream: cpal::Stream,
        rx: flume::Receiver<Vec<i16>>,
        pending: VecDeque<i16>,
    }

    impl Microphone for CpalMicrophone {
        fn open(&mut self) -> Result<Box<dyn AudioStream + '_>, CaptureError> {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| CaptureError::MicrophoneUnavailable("no input device".into()))?;
            let supported = device
                .default_input_config()
                .map_err(|e| CaptureError::MicrophoneUnavailable(e.to_string()))?;
            let input_rate = u32::from(supported.sample_rate()) as usize;
            let channels = supported.channels() as usize;

            tracing::debug!("Mic: {}Hz {}ch -> 16000Hz mono", input_rate, channels);

            let mut format = RecognizerFormat::new(channels, input_rate)?;
            let (tx, rx) = flume::unbounded::<Vec<i16>>();
            let stream = device
                .build_input_stream(
                    &supported.config(),
                    move |data: &[f32], _| {
                        let samples = format.push(data);
                        if !samples.is_empty() {
                            let _ = tx.send(samples);
                        }
                    },
                    |e| tracing::warn!("Mic error: {}", e),
                    None,
                )
                .map_err(|e| CaptureError::MicrophoneUnavailable(e.to_string()))?;
            stream
                .play()
                .map_err(|e| CaptureError::MicrophoneUnavailable(e.to_string()))?;

            Ok(Box::new(CpalStream {
                _stream: stream,
                rx,
                pending: VecDeque::new(),
            }))
        }
    }

    impl AudioStream for CpalStream {
        fn read_chunk(&mut self, buf: &mut [i16]) -> Result<(), CaptureError> {
            while self.pending.len() < buf.len() {
                let samples = self
                    .rx
                    .recv_timeout(READ_TIMEOUT)
                    .map_err(|_| CaptureError::Device("microphone stopped delivering audio".into()))?;
                self.pending.extend(samples);
            }
            for (slot, sample) in buf.iter_mut().zip(self.pending.drain(..buf.len())) {
                *slot = sample;
            }
            Ok(())
        }
    }
}
