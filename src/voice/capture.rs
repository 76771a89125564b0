//! Audio capture from microphone

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::time::Instant;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Something that records microphone audio into a buffer
///
/// Capture state machines drive a recorder; tests swap in a scripted one.
pub trait Recorder {
    /// Open the input stream; a no-op while already capturing
    ///
    /// # Errors
    ///
    /// Returns error if the input device cannot be opened
    fn start(&mut self) -> Result<()>;

    /// Close the input stream
    fn stop(&mut self);

    /// Take everything captured since the last take or clear
    fn take_buffer(&self) -> Vec<f32>;

    /// Discard captured audio
    fn clear_buffer(&self);

    fn is_capturing(&self) -> bool;

    fn sample_rate(&self) -> u32;
}

/// One captured utterance ready for recognition
#[derive(Debug, Clone)]
pub struct Utterance {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// When capture began (key press or speech onset)
    pub started_at: Instant,
    /// When capture ended (key release, pause or cap)
    pub ended_at: Instant,
}

impl Utterance {
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32, started_at: Instant, ended_at: Instant) -> Self {
        Self {
            samples,
            sample_rate,
            started_at,
            ended_at,
        }
    }

    /// Wall-clock span between the start and end events
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.ended_at.saturating_duration_since(self.started_at)
    }

    /// Length of the recorded audio
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn audio_duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Captures audio from an input device
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Create a new audio capture instance
    ///
    /// `device_name` picks an input device by name; `None` uses the default.
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = input_device(device_name)?;
        let config = input_config(&device)?;

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Get captured audio buffer without clearing
    #[must_use]
    pub fn peek_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }
}

impl Recorder for AudioCapture {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let channels = usize::from(self.config.channels.max(1));

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        if channels == 1 {
                            buf.extend_from_slice(data);
                        } else {
                            #[allow(clippy::cast_precision_loss)]
                            buf.extend(
                                data.chunks(channels)
                                    .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                            );
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    fn take_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    fn clear_buffer(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }

    fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn input_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    let Some(wanted) = name else {
        return host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()));
    };

    host.input_devices()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|d| d.name().is_ok_and(|n| n == wanted))
        .ok_or_else(|| Error::Audio(format!("input device {wanted:?} not found")))
}

/// Prefer 16 kHz mono, then 16 kHz with any channel count, then the device default
fn input_config(device: &Device) -> Result<StreamConfig> {
    let at_speech_rate = |mono: bool| {
        device.supported_input_configs().ok()?.find(|c| {
            (!mono || c.channels() == 1)
                && c.sample_format() == cpal::SampleFormat::F32
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
    };

    if let Some(range) = at_speech_rate(true).or_else(|| at_speech_rate(false)) {
        return Ok(range.with_sample_rate(SampleRate(SAMPLE_RATE)).config());
    }

    let default = device
        .default_input_config()
        .map_err(|e| Error::Audio(e.to_string()))?;
    if default.sample_format() != cpal::SampleFormat::F32 {
        return Err(Error::Audio("no suitable audio config found".to_string()));
    }
    Ok(default.config())
}
