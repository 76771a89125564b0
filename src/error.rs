//! Error types for the speech I/O subsystem

use thiserror::Error;

/// Result type alias for speech operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the speech I/O subsystem
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// More than one provider enabled for the same direction
    #[error("cannot have multiple {direction} providers enabled at once: {}", enabled.join(", "))]
    ConflictingConfiguration {
        /// Direction with the conflict ("speak" or "listen")
        direction: &'static str,
        /// Names of every enabled provider
        enabled: Vec<&'static str>,
    },

    /// Enabled provider is missing its dependency or credentials
    #[error("provider {provider} is unavailable: {reason}")]
    ProviderUnavailable {
        /// Provider name
        provider: &'static str,
        /// Why it cannot be used
        reason: String,
    },

    /// No provider is enabled for a direction
    #[error("no {0} provider enabled")]
    NoProviderAvailable(&'static str),

    /// Synthesizing one segment failed
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio output device failed
    #[error("playback error: {0}")]
    Playback(String),

    /// Recognition call failed
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Recognition completed but heard nothing usable
    #[error("no speech detected")]
    NoSpeechDetected,

    /// Wait aborted by a process interrupt
    #[error("interrupted")]
    Interrupted,

    /// Audio device or codec error
    #[error("audio error: {0}")]
    Audio(String),

    /// Keyboard event source error
    #[error("keyboard error: {0}")]
    Keyboard(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether the error must stop the process instead of degrading
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ConflictingConfiguration { .. })
    }
}
