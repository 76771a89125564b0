//! Provider registry
//!
//! Every backend's availability is resolved once at startup into a static
//! table. The registry then enforces that at most one provider is enabled per
//! direction and hands out the one that is.

use std::fmt;
use std::path::Path;

use crate::config::Config;
use crate::{Error, Result};

/// Which way speech flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Speak,
    Listen,
}

impl Direction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Speak => "speak",
            Self::Listen => "listen",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every supported backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    ElevenLabs,
    OpenAiSpeech,
    Piper,
    Azure,
    Whisper,
    Deepgram,
    WhisperCpp,
}

impl ProviderId {
    pub const ALL: [Self; 7] = [
        Self::ElevenLabs,
        Self::OpenAiSpeech,
        Self::Piper,
        Self::Azure,
        Self::Whisper,
        Self::Deepgram,
        Self::WhisperCpp,
    ];

    /// Config table name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ElevenLabs => "eleven",
            Self::OpenAiSpeech => "openai",
            Self::Piper => "piper",
            Self::Azure => "azure",
            Self::Whisper => "whisper",
            Self::Deepgram => "deepgram",
            Self::WhisperCpp => "whisper_cpp",
        }
    }

    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::ElevenLabs | Self::OpenAiSpeech | Self::Piper => Direction::Speak,
            Self::Azure | Self::Whisper | Self::Deepgram | Self::WhisperCpp => Direction::Listen,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved availability of one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAvailability {
    pub provider: ProviderId,
    pub enabled: bool,
    /// Local dependency (executable, model) present
    pub available: bool,
    /// Required credentials set
    pub credentials_present: bool,
    /// What is missing, when something is
    pub missing: Option<String>,
}

impl ProviderAvailability {
    #[must_use]
    pub const fn usable(&self) -> bool {
        self.available && self.credentials_present
    }

    fn hosted(provider: ProviderId, enabled: bool, credentials: &[(&str, bool)]) -> Self {
        let missing: Vec<&str> = credentials
            .iter()
            .filter(|(_, present)| !present)
            .map(|(name, _)| *name)
            .collect();
        Self {
            provider,
            enabled,
            available: true,
            credentials_present: missing.is_empty(),
            missing: (!missing.is_empty()).then(|| format!("{} not set", missing.join(" and "))),
        }
    }

    fn local(
        provider: ProviderId,
        enabled: bool,
        binary: &str,
        model: Option<&Path>,
        has_binary: &dyn Fn(&Path) -> bool,
    ) -> Self {
        let missing = if !has_binary(Path::new(binary)) {
            Some(format!("{binary} not found on PATH"))
        } else if model.is_none() {
            Some("model_path not set".to_string())
        } else {
            None
        };
        Self {
            provider,
            enabled,
            available: missing.is_none(),
            credentials_present: true,
            missing,
        }
    }
}

/// What selecting a direction produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// This provider is enabled and usable
    Active(ProviderId),
    /// The enabled provider can't be used; the direction degrades to a no-op
    NoOp { provider: ProviderId, reason: String },
}

/// Static provider table plus the one-enabled-per-direction rule
#[derive(Debug, Clone)]
pub struct Registry {
    table: Vec<ProviderAvailability>,
}

impl Registry {
    /// Resolve availability from config, probing `PATH` for local executables
    ///
    /// # Errors
    ///
    /// Returns `Error::ConflictingConfiguration` if a direction has more than
    /// one enabled provider
    pub fn load(config: &Config) -> Result<Self> {
        Self::load_with(config, &|binary| which::which(binary).is_ok())
    }

    /// Resolve availability with a custom executable probe
    ///
    /// # Errors
    ///
    /// Returns `Error::ConflictingConfiguration` if a direction has more than
    /// one enabled provider
    pub fn load_with(config: &Config, has_binary: &dyn Fn(&Path) -> bool) -> Result<Self> {
        let keys = &config.api_keys;
        let speak = &config.speak;
        let listen = &config.listen;

        let table = vec![
            ProviderAvailability::hosted(
                ProviderId::ElevenLabs,
                speak.eleven.enabled,
                &[("ELEVEN_API_KEY", keys.elevenlabs.is_some())],
            ),
            ProviderAvailability::hosted(
                ProviderId::OpenAiSpeech,
                speak.openai.enabled,
                &[("OPENAI_API_KEY", keys.openai.is_some())],
            ),
            ProviderAvailability::local(
                ProviderId::Piper,
                speak.piper.enabled,
                &speak.piper.binary,
                speak.piper.model_path.as_deref(),
                has_binary,
            ),
            ProviderAvailability::hosted(
                ProviderId::Azure,
                listen.azure.enabled,
                &[
                    ("SPEECH_KEY", keys.azure_key.is_some()),
                    ("SPEECH_REGION", keys.azure_region.is_some()),
                ],
            ),
            ProviderAvailability::hosted(
                ProviderId::Whisper,
                listen.whisper.enabled,
                &[("OPENAI_API_KEY", keys.openai.is_some())],
            ),
            ProviderAvailability::hosted(
                ProviderId::Deepgram,
                listen.deepgram.enabled,
                &[("DEEPGRAM_API_KEY", keys.deepgram.is_some())],
            ),
            ProviderAvailability::local(
                ProviderId::WhisperCpp,
                listen.whisper_cpp.enabled,
                &listen.whisper_cpp.binary,
                listen.whisper_cpp.model_path.as_deref(),
                has_binary,
            ),
        ];

        Self::from_table(table)
    }

    /// Build from an already resolved table
    ///
    /// # Errors
    ///
    /// Returns `Error::ConflictingConfiguration` if a direction has more than
    /// one enabled provider
    pub fn from_table(table: Vec<ProviderAvailability>) -> Result<Self> {
        for direction in [Direction::Speak, Direction::Listen] {
            let enabled: Vec<&'static str> = table
                .iter()
                .filter(|p| p.enabled && p.provider.direction() == direction)
                .map(|p| p.provider.name())
                .collect();
            if enabled.len() > 1 {
                return Err(Error::ConflictingConfiguration {
                    direction: direction.as_str(),
                    enabled,
                });
            }
        }
        Ok(Self { table })
    }

    /// The resolved table
    #[must_use]
    pub fn providers(&self) -> &[ProviderAvailability] {
        &self.table
    }

    /// Pick the provider for `direction`
    ///
    /// An enabled but unusable provider is logged and yields
    /// [`Selection::NoOp`].
    ///
    /// # Errors
    ///
    /// Returns `Error::NoProviderAvailable` if nothing is enabled
    pub fn select(&self, direction: Direction) -> Result<Selection> {
        let entry = self
            .table
            .iter()
            .find(|p| p.enabled && p.provider.direction() == direction)
            .ok_or(Error::NoProviderAvailable(direction.as_str()))?;

        if entry.usable() {
            tracing::info!(%direction, provider = %entry.provider, "provider selected");
            return Ok(Selection::Active(entry.provider));
        }

        let reason = entry
            .missing
            .clone()
            .unwrap_or_else(|| "unavailable".to_string());
        tracing::warn!(
            %direction,
            provider = %entry.provider,
            %reason,
            "provider is enabled but unavailable, direction disabled"
        );
        Ok(Selection::NoOp {
            provider: entry.provider,
            reason,
        })
    }
}
