//! User-visible error reporting.
//!
//! Every handler boundary funnels failures here: the error is formatted with
//! its full cause chain, HTML-escaped, wrapped in a code block and chunked to
//! the message ceiling. Delivery is best-effort; reporting itself never
//! raises.

use crate::telegram::{ChatId, ChatTransport};
use crate::text::{MESSAGE_CHUNK_CHARS, chunk_text, html_escape};
use tracing::{error, warn};

/// Room the `<pre>` wrapper takes out of each chunk.
const PRE_WRAP_OVERHEAD: usize = "<pre></pre>".len();

/// Report a failed job back to the chat it came from.
pub async fn report_error(transport: &dyn ChatTransport, chat_id: ChatId, err: &anyhow::Error) {
    error!(error = ?err, "Job failed");

    let headline = format!("⚠️ {err:#}");
    if let Err(e) = transport.send_message(chat_id, &headline).await {
        warn!(error = %e, "Failed to deliver error headline");
    }

    // The alternate Debug form carries the whole context chain (and a
    // backtrace when RUST_BACKTRACE is on).
    let trace = html_escape(&format!("{err:?}"));
    for chunk in chunk_text(&trace, MESSAGE_CHUNK_CHARS - PRE_WRAP_OVERHEAD) {
        let body = format!("<pre>{chunk}</pre>");
        if let Err(e) = transport.send_html(chat_id, &body).await {
            warn!(error = %e, "Failed to deliver error trace chunk");
        }
    }
}
