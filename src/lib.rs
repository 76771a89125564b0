//! Trivia Voice - spoken trivia conversations over interchangeable speech providers
//!
//! This library provides the multi-provider speech I/O subsystem:
//! - Provider registry (one enabled backend per direction)
//! - Text segmentation under provider length limits
//! - Streamed synthesis overlapped with playback
//! - Push-to-talk and pause-terminated capture feeding recognition
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Conversation (CLI)                      │
//! │   speak(text) -> bool  │  get_next() -> Option<text> │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                   SpeechIo                           │
//! │   Registry │ Segmenter → Pipeline │ Capture → STT    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Providers                           │
//! │ ElevenLabs │ OpenAI │ Piper │ Azure │ Deepgram │ ... │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod telemetry;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use telemetry::Diagnostics;
pub use voice::{Listener, Registry, Speaker, SpeechIo};
