//! Push-to-talk capture state machine
//!
//! Consumes [`KeyEvent`]s from a channel and drives a [`Recorder`]:
//!
//! ```text
//!  Idle ──press──▶ Recording ──release / max hold──▶ Finalizing ──▶ Idle
//!    ▲                                                   │
//!    └──────────── utterance handed to the caller ◀──────┘
//! ```
//!
//! The input stream is never left open when `capture` returns, whether it
//! returns an utterance, an interrupt or an error.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::capture::{Recorder, Utterance};
use super::keyboard::{KeyEvent, PhysicalKey, TriggerKey};
use crate::config::{OpenDevice, PushToTalkFileConfig};
use crate::{Error, Result};

/// Where one capture session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
    Finalizing,
}

/// Push-to-talk settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushToTalkSettings {
    pub key: TriggerKey,
    pub open_device: OpenDevice,
    pub max_hold: Duration,
}

impl TryFrom<&PushToTalkFileConfig> for PushToTalkSettings {
    type Error = Error;

    fn try_from(cfg: &PushToTalkFileConfig) -> Result<Self> {
        let max_hold = Duration::try_from_secs_f32(cfg.max_hold_secs).map_err(|_| {
            Error::Config(format!("invalid max_hold_secs: {}", cfg.max_hold_secs))
        })?;
        Ok(Self {
            key: cfg.key.parse()?,
            open_device: cfg.open_device,
            max_hold,
        })
    }
}

/// Drives one recorder from trigger key events
pub struct PushToTalk {
    settings: PushToTalkSettings,
    state: CaptureState,
}

impl PushToTalk {
    #[must_use]
    pub const fn new(settings: PushToTalkSettings) -> Self {
        Self {
            settings,
            state: CaptureState::Idle,
        }
    }

    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    #[must_use]
    pub const fn settings(&self) -> &PushToTalkSettings {
        &self.settings
    }

    /// Wait for one press and release of the trigger key and return what was recorded
    ///
    /// Events queued before this call, or stamped earlier than it, are
    /// discarded. `interrupt` resolving aborts the wait.
    ///
    /// # Errors
    ///
    /// Returns `Error::Interrupted` on interrupt, `Error::Keyboard` if the
    /// event source closes, or the recorder's error if the device won't open
    pub async fn capture<R, F>(
        &mut self,
        recorder: &mut R,
        events: &mut mpsc::Receiver<KeyEvent>,
        interrupt: F,
    ) -> Result<Utterance>
    where
        R: Recorder + ?Sized,
        F: Future<Output = ()>,
    {
        let stale = drain(events);
        if stale > 0 {
            tracing::trace!(stale, "discarded queued key events");
        }
        let armed_at = Instant::now();

        let result = self.run(recorder, events, armed_at, interrupt).await;

        recorder.stop();
        self.state = CaptureState::Idle;
        result
    }

    async fn run<R, F>(
        &mut self,
        recorder: &mut R,
        events: &mut mpsc::Receiver<KeyEvent>,
        armed_at: Instant,
        interrupt: F,
    ) -> Result<Utterance>
    where
        R: Recorder + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        self.state = CaptureState::Idle;
        if self.settings.open_device == OpenDevice::Armed {
            recorder.start()?;
        }
        tracing::info!(key = %self.settings.key, "hold the key to talk");

        let mut pressed_at: Option<Instant> = None;
        // The physical key that opened this session
        let mut held: Option<PhysicalKey> = None;

        loop {
            let deadline = pressed_at.map(|at| at + self.settings.max_hold);

            tokio::select! {
                () = &mut interrupt => {
                    tracing::debug!("push-to-talk interrupted");
                    return Err(Error::Interrupted);
                }
                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let (Some(started), Some(ended)) = (pressed_at, deadline) else {
                        continue;
                    };
                    tracing::warn!(max_hold = ?self.settings.max_hold, "key held too long, ending utterance");
                    return Ok(self.finalize(recorder, started, ended));
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        return Err(Error::Keyboard("keyboard event source closed".to_string()));
                    };

                    match event {
                        KeyEvent::Interrupt => {
                            tracing::debug!("interrupt key pressed");
                            return Err(Error::Interrupted);
                        }
                        KeyEvent::Pressed { at, .. } | KeyEvent::Released { at, .. } if at < armed_at => {
                            tracing::trace!(?event, "dropping key event from before capture");
                        }
                        KeyEvent::Pressed { key, at }
                            if self.settings.key.matches(key) && self.state == CaptureState::Idle =>
                        {
                            recorder.clear_buffer();
                            recorder.start()?;
                            self.state = CaptureState::Recording;
                            pressed_at = Some(at);
                            held = Some(key);
                            tracing::debug!(?key, "recording");
                        }
                        KeyEvent::Released { key, at }
                            if held == Some(key) && self.state == CaptureState::Recording =>
                        {
                            if let Some(started) = pressed_at {
                                return Ok(self.finalize(recorder, started, at));
                            }
                        }
                        other => tracing::trace!(?other, "ignoring key event"),
                    }
                }
            }
        }
    }

    fn finalize<R>(&mut self, recorder: &mut R, started: Instant, ended: Instant) -> Utterance
    where
        R: Recorder + ?Sized,
    {
        self.state = CaptureState::Finalizing;
        recorder.stop();
        let samples = recorder.take_buffer();
        let utterance = Utterance::new(samples, recorder.sample_rate(), started, ended);

        tracing::debug!(
            held = ?utterance.duration(),
            audio = ?utterance.audio_duration(),
            "push-to-talk utterance captured"
        );
        utterance
    }
}

fn drain(events: &mut mpsc::Receiver<KeyEvent>) -> usize {
    let mut count = 0;
    while events.try_recv().is_ok() {
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_parse_from_file_config() {
        let settings = PushToTalkSettings::try_from(&PushToTalkFileConfig::default()).unwrap();
        assert_eq!(settings.key, TriggerKey::Shift);
        assert_eq!(settings.open_device, OpenDevice::Press);
        assert_eq!(settings.max_hold, Duration::from_secs(60));
    }

    #[test]
    fn bad_key_is_rejected() {
        let cfg = PushToTalkFileConfig {
            key: "meta-hyper".to_string(),
            ..PushToTalkFileConfig::default()
        };
        assert!(PushToTalkSettings::try_from(&cfg).is_err());
    }

    #[test]
    fn negative_hold_is_rejected() {
        let cfg = PushToTalkFileConfig {
            max_hold_secs: -1.0,
            ..PushToTalkFileConfig::default()
        };
        assert!(PushToTalkSettings::try_from(&cfg).is_err());
    }
}
