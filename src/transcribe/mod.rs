//! Speech-to-text transcription.
//!
//! Engines run on a blocking worker thread and push progress through an
//! [`EventSink`]: zero or more `Partial` strings followed by exactly one
//! `Final` transcript as the last event before the stream closes.

use std::path::Path;
use tokio::sync::mpsc;

mod whisper;

pub use whisper::WhisperTranscriber;

/// Error type for transcription operations.
#[derive(Debug, thiserror::Error)]
pub enum TranscribeError {
    /// The input file could not be decoded to PCM.
    #[error("failed to decode audio: {0}")]
    Decode(String),
    /// The speech engine itself failed.
    #[error("speech engine failure: {0}")]
    Engine(String),
    /// The engine's event stream ended without a final transcript.
    #[error("engine produced no final transcript")]
    MissingFinal,
}

/// The completed transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// Complete transcript as one string.
    pub text: String,
    /// Language the engine transcribed in, if known.
    pub language: Option<String>,
}

/// One element of an engine's progress stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// An intermediate progress string: segment text or a percentage.
    Partial(String),
    /// The complete transcript. Always the last event of a stream.
    Final(Transcript),
}

/// What intermediate progress an engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Per-segment text as it is decoded.
    #[default]
    Segments,
    /// A percentage counter.
    Percent,
}

/// Sends progress events from the blocking engine thread to the orchestrator.
///
/// Sends block when the channel is full, so slow consumers apply backpressure
/// instead of dropping events. Send failures mean the orchestrator abandoned
/// the job and are ignored.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// Push an intermediate progress string.
    pub fn partial(&self, text: impl Into<String>) {
        let _ = self.tx.blocking_send(ProgressEvent::Partial(text.into()));
    }

    /// Push the final transcript. Must be called at most once, last.
    pub fn finish(&self, transcript: Transcript) {
        let _ = self.tx.blocking_send(ProgressEvent::Final(transcript));
    }
}

/// Speech-to-text engine.
///
/// `transcribe` blocks for the duration of the job; run it via
/// `tokio::task::spawn_blocking`. Implementations push every `Partial` in
/// emission order and exactly one `Final` before returning Ok.
pub trait Transcriber: Send + Sync {
    /// Short model identifier used in the result summary tag.
    fn model(&self) -> &str;

    /// Transcribe the audio file at `audio`, streaming progress into `sink`.
    fn transcribe(
        &self,
        audio: &Path,
        verbosity: Verbosity,
        sink: &EventSink,
    ) -> Result<(), TranscribeError>;
}
