//! TOML configuration file loading
//!
//! Supports `~/.config/trivia-voice/config.toml` as the default config source.
//! All fields are optional. A missing table leaves every provider in it disabled.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Logging configuration
    pub logging: LoggingFileConfig,

    /// Text-to-speech providers
    pub speak: SpeakFileConfig,

    /// Speech-to-text providers and capture settings
    pub listen: ListenFileConfig,

    /// API keys (environment variables take precedence)
    pub api_keys: ApiKeysFileConfig,
}

/// Logging configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoggingFileConfig {
    /// Base log level (e.g. "info", "debug")
    pub level: Option<String>,
}

/// Pipeline knobs shared by every speak provider
///
/// Unset values fall back to per-provider defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineFileConfig {
    /// Overlap synthesis with playback
    pub stream: Option<bool>,

    /// Synthesized segments buffered ahead of playback
    pub stream_preload: Option<usize>,

    /// Segmenter length limit in characters
    pub max_segment_len: Option<usize>,

    /// Replace ellipses with commas before synthesis
    pub avoid_ellipses: Option<bool>,
}

/// Speak provider tables
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpeakFileConfig {
    /// ElevenLabs
    pub eleven: ElevenLabsFileConfig,

    /// `OpenAI` speech
    pub openai: OpenAiTtsFileConfig,

    /// Local Piper synthesizer
    pub piper: PiperFileConfig,
}

/// ElevenLabs settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElevenLabsFileConfig {
    pub enabled: bool,

    /// Voice identifier
    pub voice_name: String,

    /// Model identifier
    pub model_type: String,

    #[serde(flatten)]
    pub pipeline: PipelineFileConfig,
}

impl Default for ElevenLabsFileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            voice_name: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model_type: "eleven_monolingual_v1".to_string(),
            pipeline: PipelineFileConfig::default(),
        }
    }
}

/// `OpenAI` speech settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiTtsFileConfig {
    pub enabled: bool,

    /// Voice (e.g. "alloy")
    pub voice_name: String,

    /// Use `tts-1-hd` instead of `tts-1`
    pub high_quality: bool,

    /// Speed multiplier (0.25 to 4.0)
    pub speed: f32,

    #[serde(flatten)]
    pub pipeline: PipelineFileConfig,
}

impl Default for OpenAiTtsFileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            voice_name: "alloy".to_string(),
            high_quality: false,
            speed: 1.0,
            pipeline: PipelineFileConfig::default(),
        }
    }
}

/// Piper settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PiperFileConfig {
    pub enabled: bool,

    /// Executable name or path
    pub binary: String,

    /// Path to the `.onnx` voice model
    pub model_path: Option<PathBuf>,

    /// Speaker id for multi-speaker models
    pub speaker: Option<u32>,

    #[serde(flatten)]
    pub pipeline: PipelineFileConfig,
}

impl Default for PiperFileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            binary: "piper".to_string(),
            model_path: None,
            speaker: None,
            pipeline: PipelineFileConfig::default(),
        }
    }
}

/// Listen provider tables and capture settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListenFileConfig {
    /// Azure speech service
    pub azure: AzureFileConfig,

    /// `OpenAI` Whisper API
    pub whisper: WhisperFileConfig,

    /// Deepgram
    pub deepgram: DeepgramFileConfig,

    /// Local whisper.cpp executable
    pub whisper_cpp: WhisperCppFileConfig,

    /// Push-to-talk capture
    pub push_to_talk: PushToTalkFileConfig,

    /// Silence-terminated capture
    pub unattended: UnattendedFileConfig,
}

/// Azure speech settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AzureFileConfig {
    pub enabled: bool,
    pub push_to_talk: bool,

    /// Input device name; default device when unset
    pub device: Option<String>,

    /// Recognition language
    pub language: String,
}

impl Default for AzureFileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            push_to_talk: true,
            device: None,
            language: "en-US".to_string(),
        }
    }
}

/// Whisper API settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WhisperFileConfig {
    pub enabled: bool,
    pub push_to_talk: bool,
    pub device: Option<String>,

    /// Model identifier
    pub model: String,
}

impl Default for WhisperFileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            push_to_talk: true,
            device: None,
            model: "whisper-1".to_string(),
        }
    }
}

/// Deepgram settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeepgramFileConfig {
    pub enabled: bool,
    pub push_to_talk: bool,
    pub device: Option<String>,

    /// Model identifier
    pub model: String,
}

impl Default for DeepgramFileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            push_to_talk: true,
            device: None,
            model: "nova-2".to_string(),
        }
    }
}

/// whisper.cpp settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WhisperCppFileConfig {
    pub enabled: bool,
    pub push_to_talk: bool,
    pub device: Option<String>,

    /// Executable name or path
    pub binary: String,

    /// Path to the ggml model
    pub model_path: Option<PathBuf>,
}

impl Default for WhisperCppFileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            push_to_talk: false,
            device: None,
            binary: "whisper-cli".to_string(),
            model_path: None,
        }
    }
}

/// When the input stream opens relative to the trigger key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenDevice {
    /// Open at key press, close at release
    #[default]
    Press,
    /// Open once the machine is waiting; audio before the press is discarded
    Armed,
}

/// Push-to-talk settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PushToTalkFileConfig {
    /// Trigger key name (e.g. "shift", "space")
    pub key: String,

    /// Input stream timing
    pub open_device: OpenDevice,

    /// Longest single held utterance
    pub max_hold_secs: f32,
}

impl Default for PushToTalkFileConfig {
    fn default() -> Self {
        Self {
            key: "shift".to_string(),
            open_device: OpenDevice::Press,
            max_hold_secs: 60.0,
        }
    }
}

/// Unattended (silence-terminated) capture settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UnattendedFileConfig {
    /// RMS level treated as speech
    pub energy_threshold: f32,

    /// Trailing silence that ends an utterance
    pub pause_threshold_secs: f32,

    /// Speech required before an utterance can end
    pub min_speech_secs: f32,

    /// Give up if no speech starts within this window
    pub start_timeout_secs: f32,

    /// Hard cap on a single listen
    pub max_listen_secs: f32,

    /// Measure ambient noise before listening
    pub auto_calibrate: bool,
}

impl Default for UnattendedFileConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 0.03,
            pause_threshold_secs: 0.8,
            min_speech_secs: 0.3,
            start_timeout_secs: 10.0,
            max_listen_secs: 15.0,
            auto_calibrate: false,
        }
    }
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApiKeysFileConfig {
    pub eleven: Option<String>,
    pub openai: Option<String>,
    pub speech_key: Option<String>,
    pub speech_region: Option<String>,
    pub deepgram: Option<String>,
}

/// Parse a config file from TOML text
///
/// # Errors
///
/// Returns error if the text is not valid for the schema
pub fn parse_config(content: &str) -> Result<ConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load a config file
///
/// An explicit `path` must exist. Without one the default path is tried and
/// `ConfigFile::default()` is returned when it doesn't exist.
///
/// # Errors
///
/// Returns error if an explicit file is missing or any file fails to parse
pub fn load_config_file(path: Option<&Path>) -> Result<ConfigFile> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = parse_config(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(ConfigFile::default());
    };

    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(ConfigFile::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/trivia-voice/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("trivia-voice").join("config.toml"))
}
