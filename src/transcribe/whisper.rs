//! Whisper transcription backend.
//!
//! Uses whisper.cpp via whisper-rs. Input files are decoded to 16 kHz mono
//! PCM by piping through ffmpeg, so any container ffmpeg can read is
//! accepted.

use super::{EventSink, TranscribeError, Transcriber, Transcript, Verbosity};
use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing::{debug, info};
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
};

/// Sample rate whisper.cpp expects.
const SAMPLE_RATE: u32 = 16_000;

/// Whisper speech-to-text transcriber.
///
/// The underlying WhisperContext is leaked intentionally - for a long-running
/// bot, the model stays loaded until the user switches models. This avoids
/// complex self-referential struct patterns while allowing the state to be
/// reused across jobs. Jobs never overlap, so the state mutex is uncontended.
pub struct WhisperTranscriber {
    state: Mutex<WhisperState>,
    name: String,
    language: Option<String>,
}

impl WhisperTranscriber {
    /// Create a new Whisper transcriber.
    ///
    /// # Arguments
    /// * `model_path` - Path to the Whisper GGML model file
    /// * `name` - Short model identifier for the result summary tag
    /// * `language` - Language code (e.g., "en", "de") or None for auto-detect
    pub fn new(
        model_path: impl AsRef<Path>,
        name: impl Into<String>,
        language: Option<String>,
    ) -> Result<Self> {
        let name = name.into();
        info!(
            path = %model_path.as_ref().display(),
            model = %name,
            language = ?language,
            "Loading Whisper model"
        );

        let ctx = WhisperContext::new_with_params(
            model_path.as_ref().to_str().context("Invalid model path")?,
            WhisperContextParameters::default(),
        )
        .context("Failed to load Whisper model")?;

        // Box and leak the context to get a 'static reference; the model
        // lives until the process exits or is replaced via /model.
        let ctx_ref: &'static WhisperContext = Box::leak(Box::new(ctx));

        let state = ctx_ref
            .create_state()
            .context("Failed to create Whisper state")?;

        info!("Whisper model and state loaded");

        Ok(Self {
            state: Mutex::new(state),
            name,
            language,
        })
    }

    /// Get the configured language.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
}

impl Transcriber for WhisperTranscriber {
    fn model(&self) -> &str {
        &self.name
    }

    fn transcribe(
        &self,
        audio: &Path,
        verbosity: Verbosity,
        sink: &EventSink,
    ) -> Result<(), TranscribeError> {
        let samples = decode_pcm(audio)?;
        debug!(
            samples = samples.len(),
            duration_secs = samples.len() as f32 / SAMPLE_RATE as f32,
            "Transcribing audio with Whisper"
        );

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(self.language.as_deref());

        // Keep whisper.cpp off stdout
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        match verbosity {
            Verbosity::Segments => {
                let sink = sink.clone();
                params.set_segment_callback_safe(move |segment: whisper_rs::SegmentCallbackData| {
                    sink.partial(segment.text.trim());
                });
            }
            Verbosity::Percent => {
                let sink = sink.clone();
                params.set_progress_callback_safe(move |progress: i32| {
                    sink.partial(format!("{progress}%"));
                });
            }
        }

        let mut state = self
            .state
            .lock()
            .map_err(|_| TranscribeError::Engine("whisper state poisoned".to_string()))?;
        state
            .full(params, &samples)
            .map_err(|e| TranscribeError::Engine(e.to_string()))?;

        // Collect all segments
        let num_segments = state.full_n_segments();
        let mut text = String::new();
        for i in 0..num_segments {
            if let Some(segment) = state.get_segment(i) {
                if let Ok(segment_text) = segment.to_str_lossy() {
                    text.push_str(&segment_text);
                }
            }
        }

        debug!(text_len = text.len(), "Transcription complete");

        sink.finish(Transcript {
            text: text.trim().to_string(),
            language: self.language.clone(),
        });
        Ok(())
    }
}

/// Decode any audio/video file to 16 kHz mono f32 PCM via ffmpeg.
fn decode_pcm(audio: &Path) -> Result<Vec<f32>, TranscribeError> {
    let output = Command::new("ffmpeg")
        .arg("-nostdin")
        .arg("-i")
        .arg(audio)
        .args(["-f", "f32le", "-ac", "1", "-ar"])
        .arg(SAMPLE_RATE.to_string())
        .arg("pipe:1")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| TranscribeError::Decode(format!("failed to run ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TranscribeError::Decode(
            stderr.lines().last().unwrap_or("ffmpeg failed").to_string(),
        ));
    }

    Ok(samples_from_le_bytes(&output.stdout))
}

/// Reinterpret little-endian f32 bytes as samples, ignoring a ragged tail.
fn samples_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_from_le_bytes() {
        let bytes = [0.5f32.to_le_bytes(), (-1.0f32).to_le_bytes()].concat();
        assert_eq!(samples_from_le_bytes(&bytes), vec![0.5, -1.0]);
    }

    #[test]
    fn test_ragged_tail_is_ignored() {
        let mut bytes = 1.0f32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0x00, 0x01]);
        assert_eq!(samples_from_le_bytes(&bytes), vec![1.0]);
    }

    #[test]
    fn test_empty_input_yields_no_samples() {
        assert!(samples_from_le_bytes(&[]).is_empty());
    }
}
