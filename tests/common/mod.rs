//! Shared test utilities
//!
//! Scripted stand-ins for providers, the speaker and the microphone so the
//! speech subsystem can be exercised without audio hardware or network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::Instant;

use trivia_voice::voice::{AudioBuffer, AudioSink, Recognizer, Recorder, Synthesizer, Utterance};
use trivia_voice::{Error, Result};

pub const RATE: u32 = 16_000;

/// Samples in one 100 ms chunk
pub const CHUNK: usize = 1600;

/// Encode text as audio so a sink can tell which segment it was given
#[allow(clippy::cast_precision_loss)]
pub fn encode_text(text: &str) -> AudioBuffer {
    AudioBuffer::new(text.bytes().map(f32::from).collect(), RATE)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn decode_text(audio: &AudioBuffer) -> String {
    audio.samples.iter().map(|s| char::from(*s as u8)).collect()
}

/// Synthesizer with random latency that fails on texts containing `FAIL`
pub struct ScriptedSynthesizer {
    latency_ms: Range<u64>,
    completed: Arc<AtomicUsize>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSynthesizer {
    pub fn new(latency_ms: Range<u64>) -> Self {
        Self {
            latency_ms,
            completed: Arc::new(AtomicUsize::new(0)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn instant() -> Self {
        Self::new(0..1)
    }

    /// Counter of finished synthesis calls
    pub fn completed(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.completed)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn synthesize(&self, text: &str) -> Result<AudioBuffer> {
        self.calls.lock().unwrap().push(text.to_string());

        let delay = rand::thread_rng().gen_range(self.latency_ms.clone());
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.completed.fetch_add(1, Ordering::SeqCst);
        if text.contains("FAIL") {
            return Err(Error::Synthesis(format!("scripted failure for {text:?}")));
        }
        Ok(encode_text(text))
    }
}

/// Sink that records what it played and catches overlapping calls
#[derive(Default)]
pub struct RecordingSink {
    played: Mutex<Vec<String>>,
    playing: AtomicBool,
    overlaps: AtomicUsize,
    play_time: Duration,
    /// Synthesis counter sampled at the first play call
    watched: Option<Arc<AtomicUsize>>,
    seen_at_first_play: Mutex<Option<usize>>,
    fail_after: Option<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each play blocks for `play_time`
    pub fn slow(play_time: Duration) -> Self {
        Self {
            play_time,
            ..Self::default()
        }
    }

    /// Record `counter` when the first buffer starts playing
    pub fn watching(counter: Arc<AtomicUsize>) -> Self {
        Self {
            watched: Some(counter),
            ..Self::default()
        }
    }

    /// Device error on every play after the first `ok` ones
    pub fn failing_after(ok: usize) -> Self {
        Self {
            fail_after: Some(ok),
            ..Self::default()
        }
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    pub fn seen_at_first_play(&self) -> Option<usize> {
        *self.seen_at_first_play.lock().unwrap()
    }
}

impl AudioSink for RecordingSink {
    fn play(&self, audio: &AudioBuffer) -> Result<()> {
        if self.playing.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        {
            let mut first = self.seen_at_first_play.lock().unwrap();
            if first.is_none() {
                *first = Some(
                    self.watched
                        .as_ref()
                        .map_or(0, |c| c.load(Ordering::SeqCst)),
                );
            }
        }

        let mut played = self.played.lock().unwrap();
        if self.fail_after.is_some_and(|ok| played.len() >= ok) {
            self.playing.store(false, Ordering::SeqCst);
            return Err(Error::Playback("scripted device failure".to_string()));
        }

        if !self.play_time.is_zero() {
            std::thread::sleep(self.play_time);
        }
        played.push(decode_text(audio));
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct RecorderState {
    capturing: bool,
    since: Instant,
    level: f32,
    buffer: Vec<f32>,
    script: VecDeque<Vec<f32>>,
    starts: usize,
    stops: usize,
}

impl RecorderState {
    /// Samples of `level` for the time since the last flush
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn flush(&mut self) {
        if !self.capturing {
            return;
        }
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.since);
        let count = (elapsed.as_secs_f64() * f64::from(RATE)).round() as usize;
        self.buffer.extend(std::iter::repeat_n(self.level, count));
        self.since = now;
    }
}

/// Microphone stand-in
///
/// Without a script it "records" a constant `level` for as long as it is
/// capturing, measured on the tokio clock. With a script each take returns
/// the next chunk.
pub struct ScriptedRecorder {
    state: Arc<Mutex<RecorderState>>,
}

/// Observes a [`ScriptedRecorder`] after it has been moved into a listener
#[derive(Clone)]
pub struct RecorderProbe {
    state: Arc<Mutex<RecorderState>>,
}

impl ScriptedRecorder {
    pub fn timed(level: f32) -> (Self, RecorderProbe) {
        Self::build(level, VecDeque::new())
    }

    pub fn scripted(chunks: Vec<Vec<f32>>) -> (Self, RecorderProbe) {
        Self::build(0.0, chunks.into())
    }

    fn build(level: f32, script: VecDeque<Vec<f32>>) -> (Self, RecorderProbe) {
        let state = Arc::new(Mutex::new(RecorderState {
            capturing: false,
            since: Instant::now(),
            level,
            buffer: Vec::new(),
            script,
            starts: 0,
            stops: 0,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            RecorderProbe { state },
        )
    }
}

impl RecorderProbe {
    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    pub fn is_capturing(&self) -> bool {
        self.state.lock().unwrap().capturing
    }
}

impl Recorder for ScriptedRecorder {
    fn start(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.capturing {
            state.capturing = true;
            state.since = Instant::now();
            state.starts += 1;
        }
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.capturing {
            state.flush();
            state.capturing = false;
            state.stops += 1;
        }
    }

    fn take_buffer(&self) -> Vec<f32> {
        let mut state = self.state.lock().unwrap();
        if let Some(chunk) = state.script.pop_front() {
            return chunk;
        }
        state.flush();
        std::mem::take(&mut state.buffer)
    }

    fn clear_buffer(&self) {
        let mut state = self.state.lock().unwrap();
        state.buffer.clear();
        state.since = Instant::now();
    }

    fn is_capturing(&self) -> bool {
        self.state.lock().unwrap().capturing
    }

    fn sample_rate(&self) -> u32 {
        RATE
    }
}

/// What a [`ScriptedRecognizer`] answers
#[derive(Debug, Clone)]
pub enum Heard {
    Text(&'static str),
    Nothing,
    Failure,
}

/// Recognizer answering from a script and remembering what it was given
pub struct ScriptedRecognizer {
    answers: Mutex<VecDeque<Heard>>,
    received: Mutex<Vec<Utterance>>,
}

impl ScriptedRecognizer {
    pub fn new(answers: impl IntoIterator<Item = Heard>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().collect()),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn received(&self) -> Vec<Utterance> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn recognize(&self, audio: &Utterance) -> Result<String> {
        self.received.lock().unwrap().push(audio.clone());
        match self.answers.lock().unwrap().pop_front() {
            Some(Heard::Text(text)) => Ok(text.to_string()),
            Some(Heard::Nothing) | None => Err(Error::NoSpeechDetected),
            Some(Heard::Failure) => Err(Error::Recognition("scripted failure".to_string())),
        }
    }
}

pub fn loud_chunk() -> Vec<f32> {
    vec![0.2; CHUNK]
}

pub fn quiet_chunk() -> Vec<f32> {
    vec![0.001; CHUNK]
}
