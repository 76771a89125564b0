//! Configuration management for the speech subsystem

pub mod file;

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use crate::Result;
pub use file::{
    ConfigFile, ListenFileConfig, OpenDevice, PipelineFileConfig, PushToTalkFileConfig,
    SpeakFileConfig, UnattendedFileConfig,
};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "TRIVIA_VOICE_CONFIG";

/// Speech subsystem configuration
#[derive(Debug)]
pub struct Config {
    /// Base log level
    pub log_level: String,

    /// Speak provider settings
    pub speak: SpeakFileConfig,

    /// Listen provider and capture settings
    pub listen: ListenFileConfig,

    /// Credentials for hosted providers
    pub api_keys: ApiKeys,

    /// File the settings were read from, if any
    pub source: Option<PathBuf>,
}

/// Credentials for hosted providers
#[derive(Debug, Default)]
pub struct ApiKeys {
    /// ElevenLabs API key
    pub elevenlabs: Option<SecretString>,

    /// `OpenAI` API key (speech and Whisper)
    pub openai: Option<SecretString>,

    /// Azure speech subscription key
    pub azure_key: Option<SecretString>,

    /// Azure speech region (e.g. "westus")
    pub azure_region: Option<String>,

    /// Deepgram API key
    pub deepgram: Option<SecretString>,
}

impl Config {
    /// Load configuration from `path`, `$TRIVIA_VOICE_CONFIG`, or the default location
    ///
    /// # Errors
    ///
    /// Returns error if an explicitly named file is missing or unparsable
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let fc = file::load_config_file(explicit.as_deref())?;
        let source = explicit.or_else(|| file::config_file_path().filter(|p| p.exists()));

        let mut config = Self::from_file(fc, |name| std::env::var(name).ok());
        config.source = source;
        Ok(config)
    }

    /// Build configuration from a parsed file, resolving credentials through `env`
    ///
    /// Credentials resolve env > toml > None.
    pub fn from_file<F>(fc: ConfigFile, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = |value: Option<String>| {
            value.filter(|v| !v.trim().is_empty()).map(SecretString::from)
        };

        let api_keys = ApiKeys {
            elevenlabs: secret(
                env("ELEVEN_API_KEY")
                    .or_else(|| env("ELEVENLABS_API_KEY"))
                    .or(fc.api_keys.eleven),
            ),
            openai: secret(env("OPENAI_API_KEY").or(fc.api_keys.openai)),
            azure_key: secret(env("SPEECH_KEY").or(fc.api_keys.speech_key)),
            azure_region: env("SPEECH_REGION")
                .or(fc.api_keys.speech_region)
                .filter(|v| !v.trim().is_empty()),
            deepgram: secret(env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram)),
        };

        Self {
            log_level: fc.logging.level.unwrap_or_else(|| "info".to_string()),
            speak: fc.speak,
            listen: fc.listen,
            api_keys,
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn env_overrides_file_keys() {
        let fc = file::parse_config(
            r#"
            [api_keys]
            openai = "from-file"
            deepgram = "dg-file"
            "#,
        )
        .unwrap();
        let config = Config::from_file(fc, env_from(&[("OPENAI_API_KEY", "from-env")]));

        assert_eq!(
            config.api_keys.openai.as_ref().unwrap().expose_secret(),
            "from-env"
        );
        assert_eq!(
            config.api_keys.deepgram.as_ref().unwrap().expose_secret(),
            "dg-file"
        );
        assert!(config.api_keys.azure_key.is_none());
    }

    #[test]
    fn blank_keys_count_as_missing() {
        let config = Config::from_file(
            ConfigFile::default(),
            env_from(&[("SPEECH_KEY", "  "), ("SPEECH_REGION", "")]),
        );
        assert!(config.api_keys.azure_key.is_none());
        assert!(config.api_keys.azure_region.is_none());
    }

    #[test]
    fn eleven_key_accepts_both_names() {
        let config = Config::from_file(
            ConfigFile::default(),
            env_from(&[("ELEVENLABS_API_KEY", "xi")]),
        );
        assert!(config.api_keys.elevenlabs.is_some());
        assert_eq!(config.log_level, "info");
    }
}
