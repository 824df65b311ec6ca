//! Update routing and command handling.
//!
//! The long-poll loop dispatches each update into its own task so lightweight
//! commands keep answering while a transcription is in flight; the job slot
//! inside [`handle_media`] is what serializes the heavy work.

use crate::config::{Config, ProgressStyle, SpeechModel};
use crate::job::{self, JobSlot, TranscriptionJob};
use crate::media::{self, MediaSource};
use crate::models::ModelManager;
use crate::report;
use crate::telegram::{Api, BotCommand, ChatId, ChatTransport, Message, Update};
use crate::transcribe::{Transcriber, Verbosity, WhisperTranscriber};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Server-side long-poll window (the Bot API maximum).
const POLL_TIMEOUT_SECS: u64 = 50;

const HELP_TEXT: &str = "Send me a voice message, video note or audio file and I'll reply with a transcript.\n\
A direct link to a media file or video works too.\n\n\
/model — show or switch the speech model\n\
/help — this message";

/// Shared state behind every handler.
pub struct BotState {
    pub config: Config,
    pub transport: Arc<dyn ChatTransport>,
    pub slot: JobSlot,
    /// The transcriber new jobs capture. /model swaps the Arc; jobs already
    /// holding a clone keep transcribing with the model they started under.
    pub active: RwLock<Arc<dyn Transcriber>>,
    pub models: ModelManager,
    pub work_dir: PathBuf,
}

fn bot_commands() -> Vec<BotCommand> {
    vec![
        BotCommand {
            command: "start",
            description: "What this bot does",
        },
        BotCommand {
            command: "help",
            description: "Usage help",
        },
        BotCommand {
            command: "model",
            description: "Show or switch the speech model",
        },
    ]
}

/// Load config'd model, connect to Telegram and poll until shutdown.
pub async fn run(config: Config) -> Result<()> {
    let token = config.telegram.resolved_token()?;
    let api = Arc::new(Api::new(&token));
    let models = ModelManager::new()?;

    let model = config.model.model;
    let model_path = models
        .ensure(model)
        .await
        .context("Failed to fetch the configured model")?;
    let transcriber =
        load_transcriber(model_path, model, config.model.engine_language()).await?;

    if let Err(e) = api.register_commands(&bot_commands()).await {
        warn!(error = %e, "Failed to register command menu");
    }

    let state = Arc::new(BotState {
        work_dir: config.media.resolved_work_dir(),
        transport: api.clone(),
        slot: JobSlot::new(),
        active: RwLock::new(transcriber),
        models,
        config,
    });

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                cancel.cancel();
            }
        });
    }

    info!("Bot started");
    poll_updates(&api, state, cancel).await;
    info!("Bot stopped");
    Ok(())
}

/// Load a Whisper engine off the async runtime.
async fn load_transcriber(
    model_path: PathBuf,
    model: SpeechModel,
    language: Option<String>,
) -> Result<Arc<dyn Transcriber>> {
    let loaded = tokio::task::spawn_blocking(move || {
        WhisperTranscriber::new(&model_path, model.name(), language)
    })
    .await
    .context("model load worker panicked")??;
    Ok(Arc::new(loaded))
}

async fn poll_updates(api: &Api, state: Arc<BotState>, cancel: CancellationToken) {
    let mut offset = 0i64;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            updates = api.get_updates(offset, POLL_TIMEOUT_SECS) => match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        tokio::spawn(handle_update(state.clone(), update));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "getUpdates failed, backing off");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                }
            },
        }
    }
}

/// Top-level handler boundary: authorize, dispatch, report failures.
pub async fn handle_update(state: Arc<BotState>, update: Update) {
    let Some(message) = update.message else { return };

    // Authorization is silent: senders off the allow-list get no reply at
    // all, not even an error.
    let username = message
        .from
        .as_ref()
        .and_then(|user| user.username.as_deref());
    if !state.config.telegram.is_allowed(username) {
        debug!("Ignoring message from non-allow-listed sender");
        return;
    }

    let chat_id = message.chat.id;
    if let Err(err) = dispatch_message(&state, &message).await {
        report::report_error(state.transport.as_ref(), chat_id, &err).await;
    }
}

async fn dispatch_message(state: &BotState, message: &Message) -> Result<()> {
    let chat_id = message.chat.id;

    if let Some(text) = message.text.as_deref() {
        let text = text.trim();
        if let Some(args) = text.strip_prefix("/model") {
            return handle_model_command(state, chat_id, args.trim()).await;
        }
        if text.starts_with("/start") || text.starts_with("/help") {
            state.transport.send_message(chat_id, HELP_TEXT).await?;
            return Ok(());
        }
        if looks_like_url(text) {
            let source = MediaSource::RemoteUrl {
                url: text.to_string(),
            };
            return handle_media(state, chat_id, source).await;
        }
        // Plain chatter is ignored.
        return Ok(());
    }

    if let Some(source) = media_source_of(message) {
        return handle_media(state, chat_id, source).await;
    }
    Ok(())
}

/// Map an inbound message to a transcription source, if it carries one.
fn media_source_of(message: &Message) -> Option<MediaSource> {
    if let Some(voice) = &message.voice {
        return Some(MediaSource::Voice {
            file_id: voice.file_id.clone(),
            file_size: voice.file_size,
        });
    }
    if let Some(note) = &message.video_note {
        return Some(MediaSource::VideoNote {
            file_id: note.file_id.clone(),
            file_size: note.file_size,
        });
    }
    if let Some(audio) = &message.audio {
        return Some(MediaSource::AudioFile {
            file_id: audio.file_id.clone(),
            file_name: audio.file_name.clone(),
            file_size: audio.file_size,
        });
    }
    if let Some(document) = &message.document
        && document
            .mime_type
            .as_deref()
            .is_some_and(|mime| mime.starts_with("audio/"))
    {
        return Some(MediaSource::AudioFile {
            file_id: document.file_id.clone(),
            file_name: document.file_name.clone(),
            file_size: document.file_size,
        });
    }
    None
}

fn looks_like_url(text: &str) -> bool {
    (text.starts_with("http://") || text.starts_with("https://"))
        && !text.contains(char::is_whitespace)
}

fn verbosity_of(style: ProgressStyle) -> Verbosity {
    match style {
        ProgressStyle::Segments => Verbosity::Segments,
        ProgressStyle::Percent => Verbosity::Percent,
    }
}

/// Admit, acquire, transcribe and deliver one media artifact.
pub async fn handle_media(state: &BotState, chat_id: ChatId, source: MediaSource) -> Result<()> {
    if let Err(rejection) = media::admit_attachment(&source) {
        info!(error = %rejection, "Attachment rejected before download");
        let notice =
            format!("⚠️ {rejection}. Send a direct link instead and I'll fetch it myself.");
        state.transport.send_message(chat_id, &notice).await?;
        return Ok(());
    }

    // Pin the model before queueing: a /model switch while this job waits
    // for the slot must not retarget it.
    let transcriber = state.active.read().await.clone();

    let _slot = state.slot.acquire().await;

    let mut audio = media::acquire(state.transport.as_ref(), &state.work_dir, &source).await?;
    media::admit_audio(&mut audio).await?;

    let job = TranscriptionJob {
        chat_id,
        display_name: source.display_name(),
        verbosity: verbosity_of(state.config.model.progress),
        transcriber,
        audio,
    };
    job::run_job(state.transport.as_ref(), job).await
}

async fn handle_model_command(state: &BotState, chat_id: ChatId, args: &str) -> Result<()> {
    if args.is_empty() {
        let current = state.active.read().await.model().to_string();
        let names: Vec<&str> = SpeechModel::all().iter().map(|m| m.name()).collect();
        let listing = format!(
            "Current model: {current}\nAvailable: {}\nSwitch with /model <name>",
            names.join(", ")
        );
        state.transport.send_message(chat_id, &listing).await?;
        return Ok(());
    }

    let Some(model) = SpeechModel::parse(args) else {
        let notice = format!("Unknown model \"{args}\". See /model for the list.");
        state.transport.send_message(chat_id, &notice).await?;
        return Ok(());
    };

    let path = state
        .models
        .ensure(model)
        .await
        .context("failed to fetch model")?;
    let transcriber = load_transcriber(path, model, state.config.model.engine_language())
        .await
        .context("failed to load model")?;
    *state.active.write().await = transcriber;
    info!(model = model.name(), "Model switched");

    let notice = format!("Model switched to {}.", model.name());
    state.transport.send_message(chat_id, &notice).await?;
    Ok(())
}

#[cfg(test)]
#[path = "bot_test.rs"]
mod tests;
