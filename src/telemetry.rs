//! Process-wide diagnostics
//!
//! A [`Diagnostics`] guard installs the `tracing` subscriber at startup and
//! flushes output when dropped at shutdown. Logs go to stderr so stdout stays
//! free for the conversation.

use std::io::Write;

use tracing_subscriber::EnvFilter;

/// Holds the diagnostics sink for the life of the process
#[must_use = "diagnostics are flushed when the guard drops"]
pub struct Diagnostics {
    directive: String,
}

impl Diagnostics {
    /// Install the global subscriber
    ///
    /// `RUST_LOG` wins over `base_level` and `verbose` when set. Installing
    /// twice keeps the first subscriber.
    pub fn init(base_level: &str, verbose: u8) -> Self {
        let directive = filter_directive(base_level, verbose);
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&directive))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok();

        if installed {
            tracing::debug!(%directive, "diagnostics initialized");
        }
        Self { directive }
    }

    /// Filter in effect when `RUST_LOG` is unset
    #[must_use]
    pub fn directive(&self) -> &str {
        &self.directive
    }
}

impl Drop for Diagnostics {
    fn drop(&mut self) {
        tracing::debug!("diagnostics shutting down");
        let _ = std::io::stderr().flush();
        let _ = std::io::stdout().flush();
    }
}

/// Filter directive for a base level raised by `-v` flags
#[must_use]
pub fn filter_directive(base_level: &str, verbose: u8) -> String {
    match verbose {
        0 => format!("{base_level},trivia_voice={base_level}"),
        1 => format!("{base_level},trivia_voice=debug"),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}
