//! Telegram Bot API transport.
//!
//! A thin typed client over the HTTP Bot API, plus the [`ChatTransport`]
//! trait the transcription pipeline talks to so tests can substitute a mock.

mod api;

pub use api::Api;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for Bot API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level HTTP failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The API answered with ok=false.
    #[error("Telegram API error: {0}")]
    Telegram(String),
    /// Local filesystem failure while storing a download.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The API answered with a payload we can't use.
    #[error("malformed API response: {0}")]
    Malformed(String),
}

/// Chat identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

/// Message identifier within a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

/// One long-poll update. Only message updates are of interest.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: Option<Voice>,
    #[serde(default)]
    pub video_note: Option<VideoNote>,
    #[serde(default)]
    pub audio: Option<Audio>,
    #[serde(default)]
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    #[serde(default)]
    pub username: Option<String>,
}

/// A recorded voice message (Opus in an OGG container).
#[derive(Debug, Clone, Deserialize)]
pub struct Voice {
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// A circular video message.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoNote {
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// A music/audio file sent as such.
#[derive(Debug, Clone, Deserialize)]
pub struct Audio {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// A generic file attachment.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// getFile result; `file_path` is relative to the file download endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub file_path: Option<String>,
}

/// A command menu entry for setMyCommands.
#[derive(Debug, Clone, Serialize)]
pub struct BotCommand {
    pub command: &'static str,
    pub description: &'static str,
}

/// The chat capabilities the transcription pipeline needs.
///
/// [`Api`] is the real implementation; tests substitute a recording mock.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a plain-text message, returning its id.
    async fn send_message(&self, chat: ChatId, text: &str) -> Result<MessageId, ApiError>;

    /// Send an HTML-formatted message, returning its id.
    async fn send_html(&self, chat: ChatId, text: &str) -> Result<MessageId, ApiError>;

    /// Send a plain-text reply to an earlier message.
    async fn send_reply(
        &self,
        chat: ChatId,
        reply_to: MessageId,
        text: &str,
    ) -> Result<MessageId, ApiError>;

    /// Replace an existing message's text.
    async fn edit_message(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
    ) -> Result<(), ApiError>;

    /// Delete a message.
    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<(), ApiError>;

    /// Download an attachment into `dest`, returning the byte count written.
    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<u64, ApiError>;

    /// Register the bot's command menu.
    async fn register_commands(&self, commands: &[BotCommand]) -> Result<(), ApiError>;
}
