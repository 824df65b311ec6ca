use super::*;
use crate::telegram::{ApiError, BotCommand, MessageId};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tempfile::TempDir;

/// Everything the pipeline did to the chat, in order.
#[derive(Debug, Clone, PartialEq)]
enum Call {
    Send(String),
    Reply(MessageId, String),
    Edit(MessageId, String),
    Delete(MessageId),
}

#[derive(Default)]
struct RecordingTransport {
    calls: StdMutex<Vec<Call>>,
    next_id: AtomicI64,
    fail_edits: bool,
}

impl RecordingTransport {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn allocate_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(&self, _chat: ChatId, text: &str) -> Result<MessageId, ApiError> {
        let id = self.allocate_id();
        self.calls.lock().unwrap().push(Call::Send(text.to_string()));
        Ok(id)
    }

    async fn send_html(&self, chat: ChatId, text: &str) -> Result<MessageId, ApiError> {
        self.send_message(chat, text).await
    }

    async fn send_reply(
        &self,
        _chat: ChatId,
        reply_to: MessageId,
        text: &str,
    ) -> Result<MessageId, ApiError> {
        let id = self.allocate_id();
        self.calls
            .lock()
            .unwrap()
            .push(Call::Reply(reply_to, text.to_string()));
        Ok(id)
    }

    async fn edit_message(
        &self,
        _chat: ChatId,
        message: MessageId,
        text: &str,
    ) -> Result<(), ApiError> {
        if self.fail_edits {
            return Err(ApiError::Telegram("message is not modified".into()));
        }
        self.calls
            .lock()
            .unwrap()
            .push(Call::Edit(message, text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, _chat: ChatId, message: MessageId) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(Call::Delete(message));
        Ok(())
    }

    async fn download_file(&self, _file_id: &str, _dest: &Path) -> Result<u64, ApiError> {
        Ok(0)
    }

    async fn register_commands(&self, _commands: &[BotCommand]) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Engine that replays a scripted event stream.
struct ScriptedTranscriber {
    name: &'static str,
    partials: Vec<&'static str>,
    final_text: Option<String>,
    fail: bool,
}

impl ScriptedTranscriber {
    fn finishing_with(text: &str) -> Self {
        Self {
            name: "scripted",
            partials: Vec::new(),
            final_text: Some(text.to_string()),
            fail: false,
        }
    }
}

impl Transcriber for ScriptedTranscriber {
    fn model(&self) -> &str {
        self.name
    }

    fn transcribe(
        &self,
        _audio: &Path,
        _verbosity: Verbosity,
        sink: &EventSink,
    ) -> Result<(), TranscribeError> {
        for partial in &self.partials {
            sink.partial(*partial);
        }
        if self.fail {
            return Err(TranscribeError::Engine("decoder exploded".to_string()));
        }
        if let Some(text) = &self.final_text {
            sink.finish(Transcript {
                text: text.clone(),
                language: None,
            });
        }
        Ok(())
    }
}

fn job_audio() -> (NormalizedAudio, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("voice.oga");
    std::fs::write(&path, b"opus").unwrap();
    let workspace = dir.path().to_path_buf();
    (NormalizedAudio::new(dir, path), workspace)
}

fn job_with(transcriber: ScriptedTranscriber) -> (TranscriptionJob, std::path::PathBuf) {
    let (audio, workspace) = job_audio();
    let job = TranscriptionJob {
        chat_id: ChatId(7),
        display_name: "voice_message.ogg".to_string(),
        verbosity: Verbosity::Segments,
        transcriber: Arc::new(transcriber),
        audio,
    };
    (job, workspace)
}

#[tokio::test]
async fn status_message_walks_through_every_partial_in_order() {
    let transport = RecordingTransport::default();
    let (job, _) = job_with(ScriptedTranscriber {
        partials: vec!["hello", "hello world"],
        ..ScriptedTranscriber::finishing_with("hello world.")
    });

    run_job(&transport, job).await.unwrap();

    let status = MessageId(1);
    assert_eq!(
        transport.calls(),
        vec![
            Call::Send(STATUS_PLACEHOLDER.to_string()),
            Call::Edit(status, "hello".to_string()),
            Call::Edit(status, "hello world".to_string()),
            Call::Delete(status),
            Call::Send("hello world.".to_string()),
            Call::Reply(
                MessageId(2),
                "#result #scripted voice_message.ogg".to_string()
            ),
        ]
    );
}

#[tokio::test]
async fn edit_failures_do_not_abort_the_job() {
    let transport = RecordingTransport {
        fail_edits: true,
        ..Default::default()
    };
    let (job, _) = job_with(ScriptedTranscriber {
        partials: vec!["12%", "80%"],
        ..ScriptedTranscriber::finishing_with("done")
    });

    run_job(&transport, job).await.unwrap();

    let calls = transport.calls();
    assert!(calls.contains(&Call::Send("done".to_string())));
}

#[tokio::test]
async fn long_transcript_is_chunked_and_summary_replies_to_first_chunk() {
    let transport = RecordingTransport::default();
    let text = "x".repeat(MESSAGE_CHUNK_CHARS + 500);
    let (job, _) = job_with(ScriptedTranscriber::finishing_with(&text));

    run_job(&transport, job).await.unwrap();

    let sends: Vec<String> = transport
        .calls()
        .iter()
        .filter_map(|call| match call {
            Call::Send(text) if text != STATUS_PLACEHOLDER => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(sends.len(), 2);
    assert_eq!(sends[0].chars().count(), MESSAGE_CHUNK_CHARS);
    assert_eq!(sends[1].chars().count(), 500);
    assert_eq!(format!("{}{}", sends[0], sends[1]), text);

    // Status was message 1, so the first chunk is message 2.
    let calls = transport.calls();
    let reply = calls
        .iter()
        .find_map(|call| match call {
            Call::Reply(to, text) => Some((*to, text.clone())),
            _ => None,
        })
        .expect("summary reply sent");
    assert_eq!(reply.0, MessageId(2));
    assert_eq!(reply.1, "#result #scripted voice_message.ogg");
}

#[tokio::test]
async fn empty_transcript_sends_notice_and_no_summary() {
    let transport = RecordingTransport::default();
    let (job, _) = job_with(ScriptedTranscriber::finishing_with(""));

    run_job(&transport, job).await.unwrap();

    let calls = transport.calls();
    assert!(calls.contains(&Call::Send(EMPTY_TRANSCRIPT_NOTICE.to_string())));
    assert!(!calls.iter().any(|c| matches!(c, Call::Reply(..))));
}

#[tokio::test]
async fn engine_failure_surfaces_after_status_cleanup() {
    let transport = RecordingTransport::default();
    let (job, workspace) = job_with(ScriptedTranscriber {
        fail: true,
        partials: vec!["3%"],
        ..ScriptedTranscriber::finishing_with("never")
    });

    let err = run_job(&transport, job).await.unwrap_err();
    assert!(format!("{err:#}").contains("decoder exploded"));

    // The status message was still deleted, and nothing was delivered.
    let calls = transport.calls();
    assert!(calls.contains(&Call::Delete(MessageId(1))));
    assert!(!calls.contains(&Call::Send("never".to_string())));

    // Cleanup ran despite the failure.
    assert!(!workspace.exists());
}

#[tokio::test]
async fn stream_without_final_event_is_an_error() {
    let transport = RecordingTransport::default();
    let (job, _) = job_with(ScriptedTranscriber {
        partials: vec!["50%"],
        final_text: None,
        fail: false,
        name: "scripted",
    });

    let err = run_job(&transport, job).await.unwrap_err();
    assert!(err.to_string().contains("no final transcript"));
}

#[tokio::test]
async fn workspace_is_removed_after_success() {
    let transport = RecordingTransport::default();
    let (job, workspace) = job_with(ScriptedTranscriber::finishing_with("ok"));

    run_job(&transport, job).await.unwrap();
    assert!(!workspace.exists());
}

#[tokio::test]
async fn job_keeps_the_transcriber_it_was_created_with() {
    let transport = RecordingTransport::default();
    let (job, _) = job_with(ScriptedTranscriber {
        name: "old-model",
        ..ScriptedTranscriber::finishing_with("pinned")
    });

    // Simulates /model switching the shared handle mid-flight: the job holds
    // its own Arc, so the swap must not affect it.
    let shared: Arc<StdMutex<Arc<dyn Transcriber>>> =
        Arc::new(StdMutex::new(job.transcriber.clone()));
    *shared.lock().unwrap() = Arc::new(ScriptedTranscriber {
        name: "new-model",
        ..ScriptedTranscriber::finishing_with("other")
    });

    run_job(&transport, job).await.unwrap();

    let calls = transport.calls();
    let summary = calls
        .iter()
        .find_map(|call| match call {
            Call::Reply(_, text) => Some(text.clone()),
            _ => None,
        })
        .unwrap();
    assert!(summary.contains("#old-model"));
}

#[tokio::test]
async fn slot_never_admits_two_jobs_at_once() {
    let slot = Arc::new(JobSlot::new());
    let busy = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let slot = slot.clone();
        let busy = busy.clone();
        let overlapped = overlapped.clone();
        handles.push(tokio::spawn(async move {
            let _guard = slot.acquire().await;
            if busy.swap(true, Ordering::SeqCst) {
                overlapped.store(true, Ordering::SeqCst);
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            busy.store(false, Ordering::SeqCst);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(!overlapped.load(Ordering::SeqCst));
}
