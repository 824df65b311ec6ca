//! HTTP client for the Telegram Bot API.

use super::{ApiError, BotCommand, ChatId, ChatTransport, FileInfo, Message, MessageId, Update};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// Bot API client bound to one bot token.
pub struct Api {
    client: reqwest::Client,
    base: String,
    file_base: String,
}

impl Api {
    pub fn new(token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: format!("https://api.telegram.org/bot{token}"),
            file_base: format!("https://api.telegram.org/file/bot{token}"),
        }
    }

    /// Call a Bot API method with a JSON body and decode the result.
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T, ApiError> {
        let mut request = self
            .client
            .post(format!("{}/{method}", self.base))
            .json(params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response: ApiResponse<T> = request.send().await?.json().await?;
        if !response.ok {
            return Err(ApiError::Telegram(
                response
                    .description
                    .unwrap_or_else(|| format!("{method} failed without description")),
            ));
        }
        response
            .result
            .ok_or_else(|| ApiError::Malformed(format!("{method} answered ok without a result")))
    }

    /// Long-poll for updates past `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, ApiError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message"],
            }),
            // Leave headroom over the server-side poll window.
            Some(Duration::from_secs(timeout_secs + 10)),
        )
        .await
    }

    async fn get_file(&self, file_id: &str) -> Result<FileInfo, ApiError> {
        self.call("getFile", &json!({ "file_id": file_id }), None)
            .await
    }
}

#[async_trait]
impl ChatTransport for Api {
    async fn send_message(&self, chat: ChatId, text: &str) -> Result<MessageId, ApiError> {
        let message: Message = self
            .call(
                "sendMessage",
                &json!({ "chat_id": chat, "text": text }),
                None,
            )
            .await?;
        Ok(message.message_id)
    }

    async fn send_html(&self, chat: ChatId, text: &str) -> Result<MessageId, ApiError> {
        let message: Message = self
            .call(
                "sendMessage",
                &json!({ "chat_id": chat, "text": text, "parse_mode": "HTML" }),
                None,
            )
            .await?;
        Ok(message.message_id)
    }

    async fn send_reply(
        &self,
        chat: ChatId,
        reply_to: MessageId,
        text: &str,
    ) -> Result<MessageId, ApiError> {
        let message: Message = self
            .call(
                "sendMessage",
                &json!({
                    "chat_id": chat,
                    "text": text,
                    "reply_parameters": { "message_id": reply_to },
                }),
                None,
            )
            .await?;
        Ok(message.message_id)
    }

    async fn edit_message(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
    ) -> Result<(), ApiError> {
        // editMessageText returns the edited Message; we only need success.
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                &json!({ "chat_id": chat, "message_id": message, "text": text }),
                None,
            )
            .await?;
        Ok(())
    }

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .call(
                "deleteMessage",
                &json!({ "chat_id": chat, "message_id": message }),
                None,
            )
            .await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<u64, ApiError> {
        let info = self.get_file(file_id).await?;
        let file_path = info
            .file_path
            .ok_or_else(|| ApiError::Malformed("getFile answered without file_path".into()))?;

        let response = self
            .client
            .get(format!("{}/{file_path}", self.file_base))
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;

        tokio::fs::write(dest, &bytes).await?;
        debug!(file_id, dest = %dest.display(), size = bytes.len(), "Attachment downloaded");
        Ok(bytes.len() as u64)
    }

    async fn register_commands(&self, commands: &[BotCommand]) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .call("setMyCommands", &json!({ "commands": commands }), None)
            .await?;
        Ok(())
    }
}
