//! The `listen` entry point

use std::future::Future;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;

use super::capture::{AudioCapture, Recorder, Utterance};
use super::keyboard::{self, KeyEvent};
use super::push_to_talk::{PushToTalk, PushToTalkSettings};
use super::registry::{Direction, ProviderId, Registry, Selection};
use super::stt::{Recognizer, SpeechToText};
use super::unattended::{UnattendedCapture, UnattendedSettings};
use crate::config::Config;
use crate::{Error, Result};

/// How an utterance is delimited
pub enum CaptureMode {
    /// Hold a key while talking
    PushToTalk {
        machine: PushToTalk,
        events: mpsc::Receiver<KeyEvent>,
    },
    /// Listen until a pause
    Unattended(UnattendedCapture),
}

struct Backend<R: ?Sized> {
    recognizer: Arc<dyn Recognizer>,
    mode: CaptureMode,
    recorder: Box<R>,
}

/// Captures and transcribes the user's spoken replies
pub struct Listener<R: Recorder + ?Sized = AudioCapture> {
    backend: Option<Backend<R>>,
}

impl<R: Recorder + ?Sized> Listener<R> {
    #[must_use]
    pub fn new(recognizer: Arc<dyn Recognizer>, recorder: Box<R>, mode: CaptureMode) -> Self {
        Self {
            backend: Some(Backend {
                recognizer,
                mode,
                recorder,
            }),
        }
    }

    /// A listener with no provider; callers fall back to typed input
    #[must_use]
    pub const fn unavailable() -> Self {
        Self { backend: None }
    }

    /// Whether speech input can be used at all
    #[must_use]
    pub const fn using_stt(&self) -> bool {
        self.backend.is_some()
    }

    /// Whether capture waits on a trigger key
    #[must_use]
    pub const fn is_push_to_talk(&self) -> bool {
        matches!(
            self.backend,
            Some(Backend {
                mode: CaptureMode::PushToTalk { .. },
                ..
            })
        )
    }

    /// Capture one utterance and transcribe it, stopping early on Ctrl+C
    ///
    /// Returns `None` on any failure; the reason is logged.
    pub async fn get_next(&mut self) -> Option<String> {
        self.get_next_with(ctrl_c()).await
    }

    /// [`Self::get_next`] with a caller-supplied interrupt
    pub async fn get_next_with<F>(&mut self, interrupt: F) -> Option<String>
    where
        F: Future<Output = ()>,
    {
        match self.listen(interrupt).await {
            Ok(text) => Some(text),
            Err(Error::NoSpeechDetected) => {
                tracing::info!("no speech detected");
                None
            }
            Err(Error::Interrupted) => None,
            Err(e) => {
                tracing::warn!(error = %e, "speech recognition failed");
                None
            }
        }
    }

    /// Capture and transcribe one utterance
    ///
    /// # Errors
    ///
    /// Returns `Error::NoProviderAvailable` without a provider, or any capture
    /// or recognition error
    pub async fn listen<F>(&mut self, interrupt: F) -> Result<String>
    where
        F: Future<Output = ()>,
    {
        let utterance = self.capture(interrupt).await?;
        let Some(backend) = &self.backend else {
            return Err(Error::NoProviderAvailable("listen"));
        };
        backend.recognizer.recognize(&utterance).await
    }

    /// Capture one utterance without transcribing it
    ///
    /// # Errors
    ///
    /// Returns `Error::NoProviderAvailable` without a provider, or any capture
    /// error
    pub async fn capture<F>(&mut self, interrupt: F) -> Result<Utterance>
    where
        F: Future<Output = ()>,
    {
        let Some(backend) = &mut self.backend else {
            return Err(Error::NoProviderAvailable("listen"));
        };

        match &mut backend.mode {
            CaptureMode::PushToTalk { machine, events } => {
                machine
                    .capture(backend.recorder.as_mut(), events, interrupt)
                    .await
            }
            CaptureMode::Unattended(unattended) => {
                unattended
                    .capture(backend.recorder.as_mut(), interrupt)
                    .await
            }
        }
    }
}

impl Listener<AudioCapture> {
    /// Build the listener the registry selects
    ///
    /// Provider and device problems leave the listener unavailable.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the push-to-talk settings are invalid
    pub fn from_config(config: &Config, registry: &Registry) -> Result<Self> {
        let id = match registry.select(Direction::Listen) {
            Ok(Selection::Active(id)) => id,
            Ok(Selection::NoOp { .. }) => return Ok(Self::unavailable()),
            Err(e) => {
                tracing::info!(error = %e, "speech-to-text disabled");
                return Ok(Self::unavailable());
            }
        };

        let (stt, push_to_talk, device) = match build_recognizer(config, id) {
            Ok(built) => built,
            Err(e) => {
                tracing::warn!(provider = %id, error = %e, "speech-to-text unavailable");
                return Ok(Self::unavailable());
            }
        };

        let recorder = match AudioCapture::new(device.as_deref()) {
            Ok(recorder) => recorder,
            Err(e) => {
                tracing::warn!(error = %e, "no audio input, speech-to-text disabled");
                return Ok(Self::unavailable());
            }
        };

        let mode = if push_to_talk {
            let settings = PushToTalkSettings::try_from(&config.listen.push_to_talk)?;
            match keyboard::listen(settings.key) {
                Ok(events) => CaptureMode::PushToTalk {
                    machine: PushToTalk::new(settings),
                    events,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "push-to-talk unavailable, listening for pauses instead");
                    CaptureMode::Unattended(unattended(config))
                }
            }
        } else {
            CaptureMode::Unattended(unattended(config))
        };

        Ok(Self::new(Arc::new(stt), Box::new(recorder), mode))
    }
}

fn unattended(config: &Config) -> UnattendedCapture {
    UnattendedCapture::new(UnattendedSettings::from(&config.listen.unattended))
}

/// Construct and prepare the recognizer for `id`, with its push-to-talk flag
/// and device override
fn build_recognizer(config: &Config, id: ProviderId) -> Result<(SpeechToText, bool, Option<String>)> {
    let listen = &config.listen;
    let keys = &config.api_keys;
    let missing = |reason: &str| Error::ProviderUnavailable {
        provider: id.name(),
        reason: reason.to_string(),
    };
    let secret = |key: Option<&SecretString>| {
        key.map(|k| SecretString::from(k.expose_secret().to_owned()))
            .ok_or_else(|| missing("credentials not set"))
    };

    let built = match id {
        ProviderId::Azure => (
            SpeechToText::new_azure(
                secret(keys.azure_key.as_ref())?,
                keys.azure_region.clone().ok_or_else(|| missing("SPEECH_REGION not set"))?,
                listen.azure.language.clone(),
            ),
            listen.azure.push_to_talk,
            listen.azure.device.clone(),
        ),
        ProviderId::Whisper => (
            SpeechToText::new_whisper(secret(keys.openai.as_ref())?, listen.whisper.model.clone()),
            listen.whisper.push_to_talk,
            listen.whisper.device.clone(),
        ),
        ProviderId::Deepgram => (
            SpeechToText::new_deepgram(secret(keys.deepgram.as_ref())?, listen.deepgram.model.clone()),
            listen.deepgram.push_to_talk,
            listen.deepgram.device.clone(),
        ),
        ProviderId::WhisperCpp => (
            SpeechToText::new_whisper_cpp(
                listen.whisper_cpp.binary.clone().into(),
                listen
                    .whisper_cpp
                    .model_path
                    .clone()
                    .ok_or_else(|| missing("model_path not set"))?,
            ),
            listen.whisper_cpp.push_to_talk,
            listen.whisper_cpp.device.clone(),
        ),
        other => return Err(Error::Config(format!("{other} is not a listen provider"))),
    };

    built.0.prepare()?;
    Ok(built)
}

/// Resolves on Ctrl+C; never resolves if the handler can't be installed
async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
