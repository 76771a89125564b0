//! Voice processing module
//!
//! Provider selection, text segmentation, streamed synthesis and playback,
//! and push-to-talk or pause-terminated capture feeding recognition.

mod audio;
mod capture;
mod endpoint;
pub mod keyboard;
mod listener;
mod pipeline;
mod playback;
mod push_to_talk;
mod registry;
mod segment;
mod speaker;
mod speech_io;
mod stt;
mod tts;
mod unattended;

pub use audio::{AudioBuffer, decode_mp3, decode_wav, rms, samples_to_wav};
pub use capture::{AudioCapture, Recorder, SAMPLE_RATE, Utterance};
pub use endpoint::{EndpointSettings, EndpointState, SpeechEndpointer};
pub use keyboard::{KeyEvent, PhysicalKey, TriggerKey};
pub use listener::{CaptureMode, Listener};
pub use pipeline::{PipelineOptions, PipelineReport, SpeechPipeline};
pub use playback::{AudioPlayback, AudioSink, resample};
pub use push_to_talk::{CaptureState, PushToTalk, PushToTalkSettings};
pub use registry::{Direction, ProviderAvailability, ProviderId, Registry, Selection};
pub use segment::{Segment, normalize_for_speech, segment, segment_owned};
pub use speaker::{SpeakOptions, Speaker};
pub use speech_io::SpeechIo;
pub use stt::{Recognizer, SpeechToText};
pub use tts::{Synthesizer, TextToSpeech};
pub use unattended::{UnattendedCapture, UnattendedSettings};
