//! Text-to-speech (TTS) providers

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;

use super::audio::{AudioBuffer, decode_mp3, decode_wav};
use crate::{Error, Result};

/// Anything that turns text into playable audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// One-time initialization run when the provider is selected
    ///
    /// # Errors
    ///
    /// Returns error if the provider cannot be used
    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Synthesize one segment of text
    ///
    /// # Errors
    ///
    /// Returns error if the provider call fails or returns undecodable audio
    async fn synthesize(&self, text: &str) -> Result<AudioBuffer>;
}

/// TTS provider backend
#[derive(Debug)]
enum TtsProvider {
    OpenAI {
        api_key: SecretString,
        voice: String,
        speed: f32,
        model: String,
    },
    ElevenLabs {
        api_key: SecretString,
        voice_id: String,
        model: String,
    },
    Piper {
        binary: PathBuf,
        model: PathBuf,
        speaker: Option<u32>,
    },
}

/// Synthesizes speech from text
#[derive(Debug)]
pub struct TextToSpeech {
    client: reqwest::Client,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a new TTS instance using `OpenAI`
    ///
    /// `high_quality` selects `tts-1-hd` over `tts-1`.
    #[must_use]
    pub fn new_openai(api_key: SecretString, voice: String, speed: f32, high_quality: bool) -> Self {
        let model = if high_quality { "tts-1-hd" } else { "tts-1" };
        Self {
            client: reqwest::Client::new(),
            provider: TtsProvider::OpenAI {
                api_key,
                voice,
                speed: speed.clamp(0.25, 4.0),
                model: model.to_string(),
            },
        }
    }

    /// Create a new TTS instance using ElevenLabs
    #[must_use]
    pub fn new_elevenlabs(api_key: SecretString, voice_id: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider: TtsProvider::ElevenLabs {
                api_key,
                voice_id,
                model,
            },
        }
    }

    /// Create a new TTS instance using a local Piper executable
    #[must_use]
    pub fn new_piper(binary: PathBuf, model: PathBuf, speaker: Option<u32>) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider: TtsProvider::Piper {
                binary,
                model,
                speaker,
            },
        }
    }

    /// Synthesize using `OpenAI` TTS
    async fn synthesize_openai(
        &self,
        api_key: &SecretString,
        voice: &str,
        speed: f32,
        model: &str,
        text: &str,
    ) -> Result<AudioBuffer> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model,
            input: text,
            voice,
            speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", api_key.expose_secret()))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        decode_mp3(&audio)
    }

    /// Synthesize using ElevenLabs TTS
    async fn synthesize_elevenlabs(
        &self,
        api_key: &SecretString,
        voice_id: &str,
        model: &str,
        text: &str,
    ) -> Result<AudioBuffer> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!("https://api.elevenlabs.io/v1/text-to-speech/{voice_id}");

        let request = ElevenLabsRequest {
            text,
            model_id: model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", api_key.expose_secret())
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!(
                "ElevenLabs TTS error {status}: {body}"
            )));
        }

        let audio = response.bytes().await?;
        decode_mp3(&audio)
    }

    /// Synthesize with the Piper executable
    ///
    /// Text goes in on stdin; the WAV lands in a temp file removed on drop.
    async fn synthesize_piper(
        binary: &Path,
        model: &Path,
        speaker: Option<u32>,
        text: &str,
    ) -> Result<AudioBuffer> {
        let output = tempfile::Builder::new().suffix(".wav").tempfile()?;

        let mut command = tokio::process::Command::new(binary);
        command
            .arg("--model")
            .arg(model)
            .arg("--output_file")
            .arg(output.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(speaker) = speaker {
            command.arg("--speaker").arg(speaker.to_string());
        }

        let mut child = command
            .spawn()
            .map_err(|e| Error::Synthesis(format!("failed to start piper: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
        }

        let result = child.wait_with_output().await?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(Error::Synthesis(format!(
                "piper exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        let wav = tokio::fs::read(output.path()).await?;
        decode_wav(&wav)
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    fn name(&self) -> &'static str {
        match self.provider {
            TtsProvider::OpenAI { .. } => "openai",
            TtsProvider::ElevenLabs { .. } => "eleven",
            TtsProvider::Piper { .. } => "piper",
        }
    }

    /// Piper loads its voice on every run, so selection only checks that the
    /// model and its sidecar config are in place
    fn prepare(&self) -> Result<()> {
        let TtsProvider::Piper { model, .. } = &self.provider else {
            return Ok(());
        };

        if !model.is_file() {
            return Err(Error::ProviderUnavailable {
                provider: "piper",
                reason: format!("voice model not found at {}", model.display()),
            });
        }

        let mut sidecar = model.as_os_str().to_owned();
        sidecar.push(".json");
        if !PathBuf::from(&sidecar).is_file() {
            return Err(Error::ProviderUnavailable {
                provider: "piper",
                reason: format!("voice config not found at {}", sidecar.to_string_lossy()),
            });
        }

        tracing::info!(model = %model.display(), "piper voice ready");
        Ok(())
    }

    async fn synthesize(&self, text: &str) -> Result<AudioBuffer> {
        tracing::debug!(provider = self.name(), chars = text.chars().count(), "synthesizing");
        match &self.provider {
            TtsProvider::OpenAI {
                api_key,
                voice,
                speed,
                model,
            } => {
                self.synthesize_openai(api_key, voice, *speed, model, text)
                    .await
            }
            TtsProvider::ElevenLabs {
                api_key,
                voice_id,
                model,
            } => {
                self.synthesize_elevenlabs(api_key, voice_id, model, text)
                    .await
            }
            TtsProvider::Piper {
                binary,
                model,
                speaker,
            } => Self::synthesize_piper(binary, model, *speaker, text).await,
        }
    }
}
