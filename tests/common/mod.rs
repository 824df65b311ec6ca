//! Shared doubles for the pipeline tests.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use voicescribe::telegram::{ApiError, BotCommand, ChatId, ChatTransport, MessageId};
use voicescribe::transcribe::{EventSink, TranscribeError, Transcriber, Transcript, Verbosity};

/// One recorded transport interaction, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send(ChatId, String),
    Reply(ChatId, MessageId, String),
    Edit(ChatId, MessageId, String),
    Delete(ChatId, MessageId),
    Download(String),
}

/// Transport double: records every call and materializes downloads as files.
#[derive(Default)]
pub struct FakeTransport {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicI64,
}

impl FakeTransport {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn allocate_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn send_message(&self, chat: ChatId, text: &str) -> Result<MessageId, ApiError> {
        let id = self.allocate_id();
        self.calls
            .lock()
            .unwrap()
            .push(Call::Send(chat, text.to_string()));
        Ok(id)
    }

    async fn send_html(&self, chat: ChatId, text: &str) -> Result<MessageId, ApiError> {
        self.send_message(chat, text).await
    }

    async fn send_reply(
        &self,
        chat: ChatId,
        reply_to: MessageId,
        text: &str,
    ) -> Result<MessageId, ApiError> {
        let id = self.allocate_id();
        self.calls
            .lock()
            .unwrap()
            .push(Call::Reply(chat, reply_to, text.to_string()));
        Ok(id)
    }

    async fn edit_message(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
    ) -> Result<(), ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Edit(chat, message, text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(Call::Delete(chat, message));
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<u64, ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Download(file_id.to_string()));
        tokio::fs::write(dest, b"opus-bytes").await?;
        Ok(10)
    }

    async fn register_commands(&self, _commands: &[BotCommand]) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Engine double: replays partials, holds the "CPU" briefly, then finishes.
///
/// `busy`/`overlapped` let tests prove two transcriptions never ran at once.
pub struct SlowTranscriber {
    pub partials: Vec<String>,
    pub final_text: String,
    pub hold: std::time::Duration,
    pub busy: AtomicBool,
    pub overlapped: AtomicBool,
}

impl SlowTranscriber {
    pub fn new(partials: &[&str], final_text: &str, hold: std::time::Duration) -> Self {
        Self {
            partials: partials.iter().map(|p| p.to_string()).collect(),
            final_text: final_text.to_string(),
            hold,
            busy: AtomicBool::new(false),
            overlapped: AtomicBool::new(false),
        }
    }
}

impl Transcriber for SlowTranscriber {
    fn model(&self) -> &str {
        "slow"
    }

    fn transcribe(
        &self,
        _audio: &Path,
        _verbosity: Verbosity,
        sink: &EventSink,
    ) -> Result<(), TranscribeError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        for partial in &self.partials {
            sink.partial(partial.clone());
        }
        std::thread::sleep(self.hold);
        self.busy.store(false, Ordering::SeqCst);

        sink.finish(Transcript {
            text: self.final_text.clone(),
            language: None,
        });
        Ok(())
    }
}
