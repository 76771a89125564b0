//! Speech-to-text (STT) providers

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::audio::samples_to_wav;
use super::capture::Utterance;
use crate::{Error, Result};

/// Anything that turns a captured utterance into text
#[async_trait]
pub trait Recognizer: Send + Sync {
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

    /// Transcribe one utterance
    ///
    /// # Errors
    ///
    /// Returns `Error::NoSpeechDetected` when nothing intelligible was heard,
    /// or `Error::Recognition` when the provider call fails
    async fn recognize(&self, audio: &Utterance) -> Result<String>;
}

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Response from Azure short-audio recognition
#[derive(serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AzureResponse {
    recognition_status: String,
    #[serde(default)]
    display_text: String,
}

/// STT provider backend
#[derive(Debug)]
enum SttProvider {
    Azure {
        api_key: SecretString,
        region: String,
        language: String,
    },
    Whisper {
        api_key: SecretString,
        model: String,
    },
    Deepgram {
        api_key: SecretString,
        model: String,
    },
    WhisperCpp {
        binary: PathBuf,
        model: PathBuf,
    },
}

/// Transcribes speech to text
#[derive(Debug)]
pub struct SpeechToText {
    client: reqwest::Client,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a new STT instance using Azure speech
    #[must_use]
    pub fn new_azure(api_key: SecretString, region: String, language: String) -> Self {
        Self::with_provider(SttProvider::Azure {
            api_key,
            region,
            language,
        })
    }

    /// Create a new STT instance using `OpenAI` Whisper
    #[must_use]
    pub fn new_whisper(api_key: SecretString, model: String) -> Self {
        Self::with_provider(SttProvider::Whisper { api_key, model })
    }

    /// Create a new STT instance using Deepgram
    #[must_use]
    pub fn new_deepgram(api_key: SecretString, model: String) -> Self {
        Self::with_provider(SttProvider::Deepgram { api_key, model })
    }

    /// Create a new STT instance using a local whisper.cpp executable
    #[must_use]
    pub fn new_whisper_cpp(binary: PathBuf, model: PathBuf) -> Self {
        Self::with_provider(SttProvider::WhisperCpp { binary, model })
    }

    fn with_provider(provider: SttProvider) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider,
        }
    }

    /// Transcribe using Azure short-audio REST recognition
    async fn transcribe_azure(
        &self,
        api_key: &SecretString,
        region: &str,
        language: &str,
        audio: &[u8],
        sample_rate: u32,
    ) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Azure recognition");

        let url = format!(
            "https://{region}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1?language={language}&format=simple"
        );

        let response = self
            .client
            .post(&url)
            .header("Ocp-Apim-Subscription-Key", api_key.expose_secret())
            .header(
                "Content-Type",
                format!("audio/wav; codecs=audio/pcm; samplerate={sample_rate}"),
            )
            .header("Accept", "application/json")
            .body(audio.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Recognition(format!("Azure API error {status}: {body}")));
        }

        let result: AzureResponse = response.json().await?;
        match result.recognition_status.as_str() {
            "Success" => Ok(result.display_text),
            "NoMatch" | "InitialSilenceTimeout" | "BabbleTimeout" => {
                tracing::debug!(status = %result.recognition_status, "Azure heard no speech");
                Err(Error::NoSpeechDetected)
            }
            other => Err(Error::Recognition(format!(
                "Azure recognition canceled: {other}"
            ))),
        }
    }

    /// Transcribe using `OpenAI` Whisper
    async fn transcribe_whisper(
        &self,
        api_key: &SecretString,
        model: &str,
        audio: &[u8],
    ) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Recognition(e.to_string()))?,
            )
            .text("model", model.to_string());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", api_key.expose_secret()))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Recognition(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await?;
        Ok(result.text)
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(
        &self,
        api_key: &SecretString,
        model: &str,
        audio: &[u8],
    ) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let url = format!("https://api.deepgram.com/v1/listen?model={model}&punctuate=true");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", api_key.expose_secret()))
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Recognition(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response.json().await?;

        Ok(result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default())
    }

    /// Transcribe with a local whisper.cpp executable
    ///
    /// The audio is handed over in a temp WAV file deleted when this returns.
    async fn transcribe_whisper_cpp(binary: &Path, model: &Path, audio: &[u8]) -> Result<String> {
        let input = tempfile::Builder::new().suffix(".wav").tempfile()?;
        tokio::fs::write(input.path(), audio).await?;

        let output = tokio::process::Command::new(binary)
            .arg("--model")
            .arg(model)
            .arg("--file")
            .arg(input.path())
            .arg("--no-timestamps")
            .arg("--no-prints")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Recognition(format!("failed to start whisper.cpp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Recognition(format!(
                "whisper.cpp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(parse_whisper_cpp_output(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }
}

#[async_trait]
impl Recognizer for SpeechToText {
    fn name(&self) -> &'static str {
        match self.provider {
            SttProvider::Azure { .. } => "azure",
            SttProvider::Whisper { .. } => "whisper",
            SttProvider::Deepgram { .. } => "deepgram",
            SttProvider::WhisperCpp { .. } => "whisper_cpp",
        }
    }

    fn prepare(&self) -> Result<()> {
        let SttProvider::WhisperCpp { model, .. } = &self.provider else {
            return Ok(());
        };

        if !model.is_file() {
            return Err(Error::ProviderUnavailable {
                provider: "whisper_cpp",
                reason: format!("model not found at {}", model.display()),
            });
        }
        Ok(())
    }

    async fn recognize(&self, audio: &Utterance) -> Result<String> {
        if audio.samples.is_empty() {
            return Err(Error::NoSpeechDetected);
        }

        let wav = samples_to_wav(&audio.samples, audio.sample_rate)?;
        let text = match &self.provider {
            SttProvider::Azure {
                api_key,
                region,
                language,
            } => {
                self.transcribe_azure(api_key, region, language, &wav, audio.sample_rate)
                    .await?
            }
            SttProvider::Whisper { api_key, model } => {
                self.transcribe_whisper(api_key, model, &wav).await?
            }
            SttProvider::Deepgram { api_key, model } => {
                self.transcribe_deepgram(api_key, model, &wav).await?
            }
            SttProvider::WhisperCpp { binary, model } => {
                Self::transcribe_whisper_cpp(binary, model, &wav).await?
            }
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(Error::NoSpeechDetected);
        }

        tracing::info!(provider = self.name(), transcript = %text, "transcription complete");
        Ok(text.to_string())
    }
}

/// Join whisper.cpp stdout lines, dropping blank-audio markers
fn parse_whisper_cpp_output(stdout: &str) -> String {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "[BLANK_AUDIO]")
        .collect::<Vec<_>>()
        .join(" ")
}
