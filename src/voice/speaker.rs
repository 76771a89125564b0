//! The `speak` entry point

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use super::pipeline::{PipelineOptions, SpeechPipeline};
use super::playback::{AudioPlayback, AudioSink};
use super::registry::{Direction, ProviderId, Registry, Selection};
use super::segment::{normalize_for_speech, segment_owned};
use super::tts::{Synthesizer, TextToSpeech};
use crate::config::{Config, PipelineFileConfig};
use crate::{Error, Result};

/// Segment limits for each speak provider
const PIPER_MAX_SEGMENT_LEN: usize = 150;
const OPENAI_MAX_SEGMENT_LEN: usize = 4096;
const ELEVENLABS_MAX_SEGMENT_LEN: usize = 2500;

/// Text preparation and pipeline settings for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeakOptions {
    pub pipeline: PipelineOptions,
    pub max_segment_len: usize,
    pub avoid_ellipses: bool,
}

impl SpeakOptions {
    /// Fill unset file values with defaults, using `max_segment_len` as the
    /// provider's limit
    #[must_use]
    pub fn resolve(file: &PipelineFileConfig, max_segment_len: usize) -> Self {
        Self {
            pipeline: PipelineOptions {
                streaming: file.stream.unwrap_or(false),
                preload_depth: file.stream_preload.unwrap_or(1).max(1),
            },
            max_segment_len: file.max_segment_len.unwrap_or(max_segment_len).max(1),
            avoid_ellipses: file.avoid_ellipses.unwrap_or(false),
        }
    }
}

enum Backend {
    Active {
        provider: &'static str,
        pipeline: SpeechPipeline,
        options: SpeakOptions,
    },
    /// Provider enabled but unusable; speaking silently succeeds
    Silent,
    /// No provider, or no way to play audio
    Disabled,
}

/// Speaks text through the selected provider
pub struct Speaker {
    backend: Backend,
}

impl Speaker {
    #[must_use]
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        sink: Arc<dyn AudioSink>,
        options: SpeakOptions,
    ) -> Self {
        Self {
            backend: Backend::Active {
                provider: synthesizer.name(),
                pipeline: SpeechPipeline::new(synthesizer, sink, options.pipeline),
                options,
            },
        }
    }

    /// A speaker whose provider is unavailable; `speak` is a silent success
    #[must_use]
    pub const fn silent() -> Self {
        Self {
            backend: Backend::Silent,
        }
    }

    /// A speaker with nothing to speak through; `speak` always fails
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            backend: Backend::Disabled,
        }
    }

    /// Build the speaker the registry selects
    ///
    /// Provider problems degrade the speaker rather than failing.
    pub fn from_config(config: &Config, registry: &Registry) -> Self {
        let id = match registry.select(Direction::Speak) {
            Ok(Selection::Active(id)) => id,
            Ok(Selection::NoOp { .. }) => return Self::silent(),
            Err(e) => {
                tracing::info!(error = %e, "text-to-speech disabled");
                return Self::disabled();
            }
        };

        let (synthesizer, options) = match build_synthesizer(config, id) {
            Ok(built) => built,
            Err(e) => {
                tracing::warn!(provider = %id, error = %e, "text-to-speech unavailable, audio will not be played");
                return Self::silent();
            }
        };

        let sink = match AudioPlayback::new() {
            Ok(playback) => Arc::new(playback),
            Err(e) => {
                tracing::warn!(error = %e, "no audio output, text-to-speech disabled");
                return Self::disabled();
            }
        };

        tracing::debug!(provider = %id, ?options, "speaker ready");
        Self::new(synthesizer, sink, options)
    }

    /// Provider in use, if any
    #[must_use]
    pub const fn provider(&self) -> Option<&'static str> {
        match &self.backend {
            Backend::Active { provider, .. } => Some(*provider),
            Backend::Silent | Backend::Disabled => None,
        }
    }

    /// Speak `text` and wait until playback has finished
    ///
    /// Returns false when nothing can be spoken or the audio device fails.
    pub async fn speak(&self, text: &str) -> bool {
        let (provider, pipeline, options) = match &self.backend {
            Backend::Active {
                provider,
                pipeline,
                options,
            } => (*provider, pipeline, options),
            Backend::Silent => return true,
            Backend::Disabled => return false,
        };

        let text = normalize_for_speech(text, options.avoid_ellipses);
        let segments = segment_owned(&text, options.max_segment_len);
        if segments.is_empty() {
            return true;
        }
        if segments.len() > 1 {
            tracing::debug!(?segments, "text was split into segments");
        }

        tracing::info!(
            provider,
            segments = segments.len(),
            streaming = options.pipeline.streaming,
            "requesting voice synthesis"
        );

        match pipeline.run(&segments).await {
            Ok(report) => {
                if !report.skipped.is_empty() {
                    tracing::warn!(skipped = ?report.skipped, "some segments were not spoken");
                }
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "voice playback failed");
                false
            }
        }
    }
}

/// Construct and prepare the synthesizer for `id`
fn build_synthesizer(config: &Config, id: ProviderId) -> Result<(Arc<dyn Synthesizer>, SpeakOptions)> {
    let speak = &config.speak;
    let keys = &config.api_keys;

    let (tts, options) = match id {
        ProviderId::ElevenLabs => (
            TextToSpeech::new_elevenlabs(
                require(keys.elevenlabs.as_ref(), id)?,
                speak.eleven.voice_name.clone(),
                speak.eleven.model_type.clone(),
            ),
            SpeakOptions::resolve(&speak.eleven.pipeline, ELEVENLABS_MAX_SEGMENT_LEN),
        ),
        ProviderId::OpenAiSpeech => (
            TextToSpeech::new_openai(
                require(keys.openai.as_ref(), id)?,
                speak.openai.voice_name.clone(),
                speak.openai.speed,
                speak.openai.high_quality,
            ),
            SpeakOptions::resolve(&speak.openai.pipeline, OPENAI_MAX_SEGMENT_LEN),
        ),
        ProviderId::Piper => {
            let model = speak.piper.model_path.clone().ok_or(Error::ProviderUnavailable {
                provider: id.name(),
                reason: "model_path not set".to_string(),
            })?;
            (
                TextToSpeech::new_piper(speak.piper.binary.clone().into(), model, speak.piper.speaker),
                SpeakOptions::resolve(&speak.piper.pipeline, PIPER_MAX_SEGMENT_LEN),
            )
        }
        other => {
            return Err(Error::Config(format!("{other} is not a speak provider")));
        }
    };

    tts.prepare()?;
    Ok((Arc::new(tts), options))
}

fn require(key: Option<&SecretString>, id: ProviderId) -> Result<SecretString> {
    key.map(|k| SecretString::from(k.expose_secret().to_owned()))
        .ok_or(Error::ProviderUnavailable {
            provider: id.name(),
            reason: "credentials not set".to_string(),
        })
}
