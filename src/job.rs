//! Transcription jobs: serialization, progress streaming, result delivery.
//!
//! One job runs at a time; the [`JobSlot`] mutex is held from admission
//! through cleanup. The engine runs on a blocking worker and streams tagged
//! progress events back over a channel; a single status message is edited in
//! place per `Partial` and deleted once the `Final` transcript arrives.

use crate::media::NormalizedAudio;
use crate::telegram::{ChatId, ChatTransport};
use crate::text::{MESSAGE_CHUNK_CHARS, chunk_text};
use crate::transcribe::{
    EventSink, ProgressEvent, TranscribeError, Transcriber, Transcript, Verbosity,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tracing::{debug, info};

/// Text of the status message before the first progress event arrives.
const STATUS_PLACEHOLDER: &str = "🎧 Transcribing…";

/// Reply sent when the engine heard nothing.
const EMPTY_TRANSCRIPT_NOTICE: &str = "No speech recognized.";

/// Process-wide single-flight gate for transcription jobs.
///
/// Waiters queue in whatever order the tokio mutex wakes them; no fairness
/// beyond that is promised.
#[derive(Default)]
pub struct JobSlot {
    slot: Mutex<()>,
}

impl JobSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access. The guard must be held for the whole job.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.slot.lock().await
    }
}

/// Everything one transcription run needs, captured at creation time.
///
/// The transcriber handle is pinned here: a model switch while this job is
/// in flight does not affect it. The audio value owns the job's temp
/// directory, so dropping the job (any exit path) is the cleanup.
pub struct TranscriptionJob {
    pub chat_id: ChatId,
    pub display_name: String,
    pub verbosity: Verbosity,
    pub transcriber: Arc<dyn Transcriber>,
    pub audio: NormalizedAudio,
}

/// Run one job to completion: stream progress, then deliver the transcript.
pub async fn run_job(transport: &dyn ChatTransport, job: TranscriptionJob) -> Result<()> {
    let TranscriptionJob {
        chat_id,
        display_name,
        verbosity,
        transcriber,
        audio,
    } = job;

    info!(name = %display_name, model = transcriber.model(), "Starting transcription job");

    let status = transport
        .send_message(chat_id, STATUS_PLACEHOLDER)
        .await
        .context("failed to create status message")?;

    let (tx, mut rx) = mpsc::channel(64);
    let worker = {
        let transcriber = transcriber.clone();
        let path = audio.path().to_path_buf();
        tokio::task::spawn_blocking(move || {
            let sink = EventSink::new(tx);
            transcriber.transcribe(&path, verbosity, &sink)
        })
    };

    let mut transcript: Option<Transcript> = None;
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Partial(text) => {
                // Replace, not append. Edit failures (rate limits, no-op
                // edits) must never abort the job.
                if let Err(e) = transport.edit_message(chat_id, status, &text).await {
                    debug!(error = %e, "Status edit failed");
                }
            }
            ProgressEvent::Final(t) => transcript = Some(t),
        }
    }

    let engine_result = worker.await.context("transcription worker panicked")?;

    if let Err(e) = transport.delete_message(chat_id, status).await {
        debug!(error = %e, "Failed to delete status message");
    }

    engine_result.context("transcription failed")?;
    let transcript = transcript.ok_or(TranscribeError::MissingFinal)?;

    deliver(
        transport,
        chat_id,
        &transcript.text,
        &display_name,
        transcriber.model(),
    )
    .await?;

    // `audio` drops here: the job directory and all intermediates go away.
    drop(audio);
    Ok(())
}

/// Send the final transcript as ordered ≤4095-char chunks, then a labeled
/// summary replying to the first chunk.
pub async fn deliver(
    transport: &dyn ChatTransport,
    chat_id: ChatId,
    text: &str,
    display_name: &str,
    model: &str,
) -> Result<()> {
    let chunks = chunk_text(text, MESSAGE_CHUNK_CHARS);
    let mut chunks = chunks.iter();

    let Some(first_chunk) = chunks.next() else {
        // Empty transcript: a notice instead of content, and no summary
        // since there is no content message to anchor the reply to.
        transport
            .send_message(chat_id, EMPTY_TRANSCRIPT_NOTICE)
            .await
            .context("failed to send empty-transcript notice")?;
        return Ok(());
    };

    let first_id = transport
        .send_message(chat_id, first_chunk)
        .await
        .context("failed to send transcript")?;
    for chunk in chunks {
        transport
            .send_message(chat_id, chunk)
            .await
            .context("failed to send transcript chunk")?;
    }

    let summary = format!("#result #{model} {display_name}");
    transport
        .send_reply(chat_id, first_id, &summary)
        .await
        .context("failed to send result summary")?;

    info!(chars = text.chars().count(), "Transcript delivered");
    Ok(())
}

#[cfg(test)]
#[path = "job_test.rs"]
mod tests;
