//! Energy-based speech endpointing
//!
//! Decides where an unattended utterance starts and ends from RMS energy
//! alone. Speech begins when a chunk rises above the threshold and ends after
//! a run of quiet chunks, provided enough speech was heard first.

use std::time::Duration;

use super::audio::rms;
use crate::config::UnattendedFileConfig;

/// Ambient noise is multiplied by this to get a calibrated threshold
const CALIBRATION_HEADROOM: f32 = 1.5;

/// Endpointer thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointSettings {
    /// RMS level treated as speech
    pub energy_threshold: f32,
    /// Trailing silence that ends an utterance
    pub pause: Duration,
    /// Speech required before an utterance can end
    pub min_speech: Duration,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self::from(&UnattendedFileConfig::default())
    }
}

impl From<&UnattendedFileConfig> for EndpointSettings {
    fn from(cfg: &UnattendedFileConfig) -> Self {
        Self {
            energy_threshold: cfg.energy_threshold,
            pause: secs(cfg.pause_threshold_secs),
            min_speech: secs(cfg.min_speech_secs),
        }
    }
}

/// State of the endpointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Waiting for speech
    Waiting,
    /// Speech started, accumulating
    Speaking,
    /// Enough speech followed by a pause
    Complete,
}

/// Finds utterance boundaries in a stream of audio chunks
pub struct SpeechEndpointer {
    threshold: f32,
    pause_samples: usize,
    min_speech_samples: usize,
    state: EndpointState,
    buffer: Vec<f32>,
    speech_samples: usize,
    silence_samples: usize,
}

impl SpeechEndpointer {
    #[must_use]
    pub fn new(settings: EndpointSettings, sample_rate: u32) -> Self {
        Self {
            threshold: settings.energy_threshold,
            pause_samples: samples_for(settings.pause, sample_rate),
            min_speech_samples: samples_for(settings.min_speech, sample_rate),
            state: EndpointState::Waiting,
            buffer: Vec::new(),
            speech_samples: 0,
            silence_samples: 0,
        }
    }

    /// Feed the next chunk of audio
    pub fn process(&mut self, samples: &[f32]) -> EndpointState {
        if samples.is_empty() || self.state == EndpointState::Complete {
            return self.state;
        }

        let energy = rms(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            EndpointState::Waiting => {
                if is_speech {
                    self.state = EndpointState::Speaking;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(samples);
                    self.speech_samples = samples.len();
                    self.silence_samples = 0;
                    tracing::trace!(energy, "speech detected");
                }
            }
            EndpointState::Speaking => {
                self.buffer.extend_from_slice(samples);

                if is_speech {
                    self.speech_samples += samples.len();
                    self.silence_samples = 0;
                } else {
                    self.silence_samples += samples.len();
                }

                if self.silence_samples >= self.pause_samples {
                    if self.speech_samples >= self.min_speech_samples {
                        tracing::debug!(samples = self.buffer.len(), "utterance complete");
                        self.state = EndpointState::Complete;
                    } else {
                        tracing::trace!(speech = self.speech_samples, "blip too short, resetting");
                        self.reset();
                    }
                }
            }
            EndpointState::Complete => {}
        }

        self.state
    }

    /// Raise the threshold above measured ambient noise
    ///
    /// Returns the threshold now in effect.
    pub fn calibrate(&mut self, ambient: &[f32]) -> f32 {
        let ambient_rms = rms(ambient);
        let calibrated = ambient_rms * CALIBRATION_HEADROOM;
        if calibrated > self.threshold {
            self.threshold = calibrated;
        }
        tracing::debug!(ambient = ambient_rms, threshold = self.threshold, "calibrated energy threshold");
        self.threshold
    }

    /// Take the utterance audio and return to waiting
    pub fn take_speech(&mut self) -> Vec<f32> {
        let speech = std::mem::take(&mut self.buffer);
        self.reset();
        speech
    }

    pub fn reset(&mut self) {
        self.state = EndpointState::Waiting;
        self.buffer.clear();
        self.speech_samples = 0;
        self.silence_samples = 0;
    }

    #[must_use]
    pub const fn state(&self) -> EndpointState {
        self.state
    }

    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }
}

fn secs(value: f32) -> Duration {
    Duration::try_from_secs_f32(value).unwrap_or(Duration::ZERO)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * f64::from(sample_rate)).round() as usize
}
