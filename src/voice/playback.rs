//! Audio playback to speakers

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};
use rubato::{FftFixedIn, Resampler};

use super::audio::AudioBuffer;
use crate::{Error, Result};

/// Frames fed to the resampler per call
const RESAMPLE_CHUNK: usize = 1024;

/// Somewhere audio can be played to completion
///
/// `play` blocks until the buffer has been heard. Implementations must not
/// let two buffers overlap.
pub trait AudioSink: Send + Sync {
    /// Play one buffer and wait for it to finish
    ///
    /// # Errors
    ///
    /// Returns error if the output device fails
    fn play(&self, audio: &AudioBuffer) -> Result<()>;
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    /// Held for the length of one `play` call
    device_lock: Mutex<()>,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let device = output_device()?;
        let default = device
            .default_output_config()
            .map_err(|e| Error::Playback(e.to_string()))?;

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            sample_rate = default.sample_rate().0,
            channels = default.channels(),
            "audio playback initialized"
        );

        Ok(Self {
            device_lock: Mutex::new(()),
        })
    }

    /// Play samples in a blocking manner
    fn play_blocking(audio: &AudioBuffer) -> Result<()> {
        if audio.is_empty() {
            return Ok(());
        }

        let device = output_device()?;
        let (config, rate) = output_config(&device, audio.sample_rate)?;
        let channels = usize::from(config.channels);

        let samples = if rate == audio.sample_rate {
            audio.samples.clone()
        } else {
            tracing::debug!(from = audio.sample_rate, to = rate, "resampling for output device");
            resample(&audio.samples, audio.sample_rate, rate)?
        };
        let sample_count = samples.len();

        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Release);
                                0.0
                            });
                            frame.fill(sample);
                            if pos < samples.len() {
                                pos += 1;
                            }
                        }
                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Playback(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Playback(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(rate.max(1));
        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Acquire) {
            if start.elapsed() > timeout {
                tracing::warn!("playback did not drain before timeout");
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        // Let the device flush its last period
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = sample_count, "playback complete");

        Ok(())
    }
}

impl AudioSink for AudioPlayback {
    fn play(&self, audio: &AudioBuffer) -> Result<()> {
        let _claim = self
            .device_lock
            .lock()
            .map_err(|_| Error::Playback("output device lock poisoned".to_string()))?;
        Self::play_blocking(audio)
    }
}

fn output_device() -> Result<Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Playback("no output device available".to_string()))
}

/// Pick an output config, preferring one that runs at `rate`
///
/// Falls back to the device default rate, which means resampling.
fn output_config(device: &Device, rate: u32) -> Result<(StreamConfig, u32)> {
    let supports = |channels: u16| {
        device.supported_output_configs().ok()?.find(|c| {
            c.channels() == channels
                && c.sample_format() == cpal::SampleFormat::F32
                && c.min_sample_rate() <= SampleRate(rate)
                && c.max_sample_rate() >= SampleRate(rate)
        })
    };

    if let Some(range) = supports(1).or_else(|| supports(2)) {
        return Ok((range.with_sample_rate(SampleRate(rate)).config(), rate));
    }

    let default = device
        .default_output_config()
        .map_err(|e| Error::Playback(e.to_string()))?;
    let default_rate = default.sample_rate().0;
    Ok((default.config(), default_rate))
}

/// Convert mono samples between sample rates
///
/// # Errors
///
/// Returns error if the resampler rejects the rates
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 1)
            .map_err(|e| Error::Audio(e.to_string()))?;

    let mut out = Vec::with_capacity(samples.len() * to as usize / from as usize + RESAMPLE_CHUNK);
    let mut pos = 0;

    while samples.len() - pos >= resampler.input_frames_next() {
        let take = resampler.input_frames_next();
        let frames: [&[f32]; 1] = [&samples[pos..pos + take]];
        let chunk = resampler
            .process(&frames[..], None)
            .map_err(|e| Error::Audio(e.to_string()))?;
        out.extend_from_slice(&chunk[0]);
        pos += take;
    }

    if pos < samples.len() {
        let frames: [&[f32]; 1] = [&samples[pos..]];
        let chunk = resampler
            .process_partial(Some(&frames[..]), None)
            .map_err(|e| Error::Audio(e.to_string()))?;
        out.extend_from_slice(&chunk[0]);
    }

    Ok(out)
}
