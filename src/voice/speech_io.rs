//! Speak and listen behind one handle

use std::future::Future;

use super::capture::{AudioCapture, Recorder};
use super::listener::Listener;
use super::registry::Registry;
use super::speaker::Speaker;
use crate::Result;
use crate::config::Config;

/// The conversation layer's view of speech I/O
pub struct SpeechIo<R: Recorder + ?Sized = AudioCapture> {
    registry: Registry,
    speaker: Speaker,
    listener: Listener<R>,
}

impl SpeechIo<AudioCapture> {
    /// Resolve providers and open the selected ones
    ///
    /// # Errors
    ///
    /// Returns `Error::ConflictingConfiguration` if more than one provider is
    /// enabled for a direction, or `Error::Config` for invalid capture
    /// settings. Unavailable providers only degrade their direction.
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = Registry::load(config)?;
        let speaker = Speaker::from_config(config, &registry);
        let listener = Listener::from_config(config, &registry)?;
        Ok(Self::from_parts(registry, speaker, listener))
    }
}

impl<R: Recorder + ?Sized> SpeechIo<R> {
    #[must_use]
    pub const fn from_parts(registry: Registry, speaker: Speaker, listener: Listener<R>) -> Self {
        Self {
            registry,
            speaker,
            listener,
        }
    }

    /// Speak `text`; see [`Speaker::speak`]
    pub async fn speak(&self, text: &str) -> bool {
        self.speaker.speak(text).await
    }

    /// Whether spoken input is possible
    #[must_use]
    pub const fn using_stt(&self) -> bool {
        self.listener.using_stt()
    }

    /// Next transcribed utterance, or `None`; see [`Listener::get_next`]
    pub async fn get_next(&mut self) -> Option<String> {
        self.listener.get_next().await
    }

    /// Next utterance with a caller-supplied interrupt
    pub async fn get_next_with<F>(&mut self, interrupt: F) -> Option<String>
    where
        F: Future<Output = ()>,
    {
        self.listener.get_next_with(interrupt).await
    }

    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub const fn speaker(&self) -> &Speaker {
        &self.speaker
    }

    pub const fn listener_mut(&mut self) -> &mut Listener<R> {
        &mut self.listener
    }
}
