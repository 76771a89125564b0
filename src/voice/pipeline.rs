//! Synthesis and playback pipeline
//!
//! In streaming mode one producer synthesizes segments in order onto a bounded
//! queue while one blocking consumer plays them in order. The first
//! `min(preload_depth, segments)` buffers are synthesized before the consumer
//! starts so it never waits on startup skew.
//!
//! ```text
//!  segments ──▶ producer ──▶ [ queue ≤ preload_depth ] ──▶ consumer ──▶ sink
//!               (async)                                     (blocking)
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;

use super::audio::AudioBuffer;
use super::playback::AudioSink;
use super::tts::Synthesizer;
use crate::{Error, Result};

/// How a pipeline schedules synthesis against playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Overlap synthesis with playback
    pub streaming: bool,
    /// Maximum synthesized buffers waiting for playback
    pub preload_depth: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            streaming: false,
            preload_depth: 1,
        }
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Segment indices in the order they were played
    pub played: Vec<usize>,
    /// Segment indices skipped after a synthesis failure
    pub skipped: Vec<usize>,
    /// Largest queue occupancy observed by the producer
    pub max_buffered: usize,
}

/// Synthesized audio for one segment
#[derive(Debug)]
struct SynthesisJob {
    index: usize,
    audio: AudioBuffer,
}

/// Drives a synthesizer and a sink over a list of segments
pub struct SpeechPipeline {
    synthesizer: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
    options: PipelineOptions,
}

impl SpeechPipeline {
    #[must_use]
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        sink: Arc<dyn AudioSink>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            synthesizer,
            sink,
            options,
        }
    }

    /// Synthesize and play every segment in order
    ///
    /// Segments that fail to synthesize are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if the sink fails; nothing after the failing
    /// buffer is played
    pub async fn run(&self, segments: &[String]) -> Result<PipelineReport> {
        if self.options.streaming {
            self.run_streaming(segments).await
        } else {
            self.run_sequential(segments).await
        }
    }

    /// Synthesize everything, then play everything
    async fn run_sequential(&self, segments: &[String]) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        let mut jobs = Vec::with_capacity(segments.len());

        for (index, text) in segments.iter().enumerate() {
            match self.synthesize(index, text).await {
                Some(job) => jobs.push(job),
                None => report.skipped.push(index),
            }
        }
        report.max_buffered = jobs.len();

        let sink = Arc::clone(&self.sink);
        let played = tokio::task::spawn_blocking(move || play_all(sink.as_ref(), jobs))
            .await
            .map_err(|e| Error::Playback(format!("playback task failed: {e}")))??;
        report.played = played;

        Ok(report)
    }

    async fn run_streaming(&self, segments: &[String]) -> Result<PipelineReport> {
        let depth = self.options.preload_depth.max(1);
        let (tx, mut rx) = mpsc::channel::<SynthesisJob>(depth);
        let mut report = PipelineReport::default();

        let preload = depth.min(segments.len());
        tracing::debug!(segments = segments.len(), preload, "preloading synthesis");

        let mut queued = segments.iter().enumerate();
        let mut seeded = 0;
        while seeded < preload {
            let Some((index, text)) = queued.next() else {
                break;
            };
            seeded += 1;
            match self.synthesize(index, text).await {
                Some(job) => {
                    // Capacity covers every seeded job, so this never waits
                    if tx.send(job).await.is_err() {
                        break;
                    }
                    report.max_buffered = report.max_buffered.max(occupancy(&tx));
                }
                None => report.skipped.push(index),
            }
        }

        let sink = Arc::clone(&self.sink);
        let consumer = tokio::task::spawn_blocking(move || {
            let mut played = Vec::new();
            while let Some(job) = rx.blocking_recv() {
                tracing::trace!(index = job.index, "playing segment");
                sink.play(&job.audio)?;
                played.push(job.index);
            }
            Ok::<_, Error>(played)
        });

        for (index, text) in queued {
            if tx.is_closed() {
                break;
            }
            match self.synthesize(index, text).await {
                Some(job) => {
                    if tx.send(job).await.is_err() {
                        tracing::debug!("consumer stopped, halting synthesis");
                        break;
                    }
                    report.max_buffered = report.max_buffered.max(occupancy(&tx));
                }
                None => report.skipped.push(index),
            }
        }

        // Generation done
        drop(tx);

        report.played = consumer
            .await
            .map_err(|e| Error::Playback(format!("playback task failed: {e}")))??;

        Ok(report)
    }

    async fn synthesize(&self, index: usize, text: &str) -> Option<SynthesisJob> {
        match self.synthesizer.synthesize(text).await {
            Ok(audio) => Some(SynthesisJob { index, audio }),
            Err(e) => {
                tracing::warn!(
                    provider = self.synthesizer.name(),
                    segment = index,
                    error = %e,
                    "voice synthesis failed, skipping segment"
                );
                None
            }
        }
    }
}

fn play_all(sink: &dyn AudioSink, jobs: Vec<SynthesisJob>) -> Result<Vec<usize>> {
    let mut played = Vec::with_capacity(jobs.len());
    for job in jobs {
        sink.play(&job.audio)?;
        played.push(job.index);
    }
    Ok(played)
}

/// Buffers currently waiting in the queue
fn occupancy<T>(tx: &mpsc::Sender<T>) -> usize {
    tx.max_capacity() - tx.capacity()
}
