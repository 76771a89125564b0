//! Silence-terminated capture for backends without push-to-talk

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::capture::{Recorder, Utterance};
use super::endpoint::{EndpointSettings, EndpointState, SpeechEndpointer};
use crate::config::UnattendedFileConfig;
use crate::{Error, Result};

/// How often the recorder buffer is drained into the endpointer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Ambient sample length for calibration
const CALIBRATION_WINDOW: Duration = Duration::from_secs(1);

/// Unattended capture settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnattendedSettings {
    pub endpoint: EndpointSettings,
    /// Give up if no speech starts within this window
    pub start_timeout: Duration,
    /// Hard cap on one listen
    pub max_listen: Duration,
    pub auto_calibrate: bool,
}

impl Default for UnattendedSettings {
    fn default() -> Self {
        Self::from(&UnattendedFileConfig::default())
    }
}

impl From<&UnattendedFileConfig> for UnattendedSettings {
    fn from(cfg: &UnattendedFileConfig) -> Self {
        Self {
            endpoint: EndpointSettings::from(cfg),
            start_timeout: Duration::try_from_secs_f32(cfg.start_timeout_secs)
                .unwrap_or(Duration::from_secs(10)),
            max_listen: Duration::try_from_secs_f32(cfg.max_listen_secs)
                .unwrap_or(Duration::from_secs(15)),
            auto_calibrate: cfg.auto_calibrate,
        }
    }
}

/// Listens until a pause follows speech, or a time cap is hit
pub struct UnattendedCapture {
    settings: UnattendedSettings,
}

impl UnattendedCapture {
    #[must_use]
    pub const fn new(settings: UnattendedSettings) -> Self {
        Self { settings }
    }

    /// Record one utterance without a trigger key
    ///
    /// # Errors
    ///
    /// Returns `Error::NoSpeechDetected` if nothing is said before the start
    /// timeout or the cap, `Error::Interrupted` if `interrupt` resolves, or the
    /// recorder's error if the device won't open
    pub async fn capture<R, F>(&self, recorder: &mut R, interrupt: F) -> Result<Utterance>
    where
        R: Recorder + ?Sized,
        F: Future<Output = ()>,
    {
        recorder.clear_buffer();
        recorder.start()?;
        let result = self.run(recorder, interrupt).await;
        recorder.stop();
        result
    }

    async fn run<R, F>(&self, recorder: &mut R, interrupt: F) -> Result<Utterance>
    where
        R: Recorder + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        let mut endpointer = SpeechEndpointer::new(self.settings.endpoint, recorder.sample_rate());

        if self.settings.auto_calibrate {
            tracing::info!("measuring background noise, stay quiet");
            tokio::select! {
                () = &mut interrupt => return Err(Error::Interrupted),
                () = tokio::time::sleep(CALIBRATION_WINDOW) => {}
            }
            endpointer.calibrate(&recorder.take_buffer());
        }

        tracing::info!("listening");
        let opened = Instant::now();
        let mut speech_started: Option<Instant> = None;
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = &mut interrupt => {
                    tracing::debug!("listen interrupted");
                    return Err(Error::Interrupted);
                }
                now = ticker.tick() => {
                    let chunk = recorder.take_buffer();
                    let state = endpointer.process(&chunk);

                    if state == EndpointState::Speaking && speech_started.is_none() {
                        speech_started = Some(now);
                    } else if state == EndpointState::Waiting {
                        speech_started = None;
                    }

                    if state == EndpointState::Complete {
                        let started = speech_started.unwrap_or(opened);
                        let samples = endpointer.take_speech();
                        return Ok(Utterance::new(samples, recorder.sample_rate(), started, now));
                    }

                    let elapsed = now.saturating_duration_since(opened);
                    if speech_started.is_none() && elapsed >= self.settings.start_timeout {
                        tracing::debug!(waited = ?elapsed, "no speech before timeout");
                        return Err(Error::NoSpeechDetected);
                    }

                    if elapsed >= self.settings.max_listen {
                        let Some(started) = speech_started else {
                            return Err(Error::NoSpeechDetected);
                        };
                        tracing::warn!(max_listen = ?self.settings.max_listen, "listen cap reached");
                        let samples = endpointer.take_speech();
                        return Ok(Utterance::new(samples, recorder.sample_rate(), started, now));
                    }
                }
            }
        }
    }
}
