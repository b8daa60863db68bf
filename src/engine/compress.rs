//! Context compression: replace the oldest eligible span of the
//! conversation with a model-generated summary pair.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::{ChatMessage, Role};

use super::{turn, ChatOptions, Engine};

/// Deadline for the summarization call, separate from the primary turn's
/// cancellation so a hung summarization cannot stall the main turn.
const SUMMARY_TIMEOUT: Duration = Duration::from_secs(60);

/// Tool results are clipped to this many characters in the flattened
/// transcript to bound summarization input size.
const TRANSCRIPT_TOOL_RESULT_CAP: usize = 500;

const SUMMARY_PREAMBLE: &str = "[Previous conversation summary]\n";

const SUMMARY_ACK: &str = "Understood. I have the context from our previous conversation.";

const SUMMARY_INSTRUCTION: &str = "Summarize the following conversation concisely. \
Preserve key decisions, file paths, code changes, and important context. \
Write in the same language as the conversation. Keep it under 500 characters.";

pub(crate) fn estimate_chars(messages: &[ChatMessage]) -> usize {
    messages.iter().map(ChatMessage::char_count).sum()
}

/// Compress the log when its estimated size exceeds the threshold.
/// Best-effort: any failure (no valid cut point, summarization error or
/// empty summary, timeout) leaves the log unchanged.
pub(crate) async fn compress_context(
    engine: &Engine,
    cancel: &CancellationToken,
    messages: Vec<ChatMessage>,
    opts: &ChatOptions,
) -> Vec<ChatMessage> {
    let chars = estimate_chars(&messages);
    if chars < engine.config.compress_threshold {
        return messages;
    }

    let Some((start, end)) = compression_window(&messages, engine.config.max_context_chars) else {
        return messages;
    };

    let transcript = render_transcript(&messages[start..end]);
    let Some(summary) = summarize(engine, cancel, transcript).await else {
        return messages;
    };
    if summary.is_empty() {
        return messages;
    }

    if let Some(cb) = &opts.on_compressed {
        cb(chars);
    }
    debug!(chars, start, end, "compressed conversation context");

    let mut result = Vec::with_capacity(messages.len() - (end - start) + 2);
    result.extend_from_slice(&messages[..start]);
    result.push(ChatMessage::user(format!("{SUMMARY_PREAMBLE}{summary}")));
    result.push(ChatMessage::assistant(SUMMARY_ACK));
    result.extend_from_slice(&messages[end..]);
    result
}

/// Locate the span eligible for replacement: it begins after any leading
/// system message, shrinks the remaining estimate to at most half of the
/// hard cap (or until only the last two messages remain), then extends to
/// the next user-role boundary so an assistant/tool-call pair is never
/// split. Returns `None` when no valid cut point exists.
fn compression_window(
    messages: &[ChatMessage],
    max_context_chars: usize,
) -> Option<(usize, usize)> {
    let mut start = 0;
    for (i, m) in messages.iter().enumerate() {
        if m.role == Role::System {
            start = i + 1;
            break;
        }
    }
    if start >= messages.len() {
        return None;
    }

    let mut end = start;
    let mut kept = estimate_chars(&messages[start..]);
    while end < messages.len().saturating_sub(2) && kept > max_context_chars / 2 {
        kept -= messages[end].char_count();
        end += 1;
    }
    if end <= start {
        return None;
    }

    while end < messages.len() && messages[end].role != Role::User {
        end += 1;
    }
    if end >= messages.len() {
        return None;
    }
    Some((start, end))
}

/// Flatten a span of messages to role-prefixed transcript lines.
fn render_transcript(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for m in messages {
        match m.role {
            Role::User => {
                out.push_str("User: ");
                out.push_str(&m.content);
                out.push('\n');
            }
            Role::Assistant => {
                out.push_str("Assistant: ");
                if !m.content.is_empty() {
                    out.push_str(&m.content);
                }
                for tc in &m.tool_calls {
                    out.push_str("[tool: ");
                    out.push_str(&tc.name);
                    out.push(']');
                }
                out.push('\n');
            }
            Role::Tool => {
                out.push_str("Tool result: ");
                if m.content.chars().count() > TRANSCRIPT_TOOL_RESULT_CAP {
                    let clipped: String =
                        m.content.chars().take(TRANSCRIPT_TOOL_RESULT_CAP).collect();
                    out.push_str(&clipped);
                    out.push_str("...");
                } else {
                    out.push_str(&m.content);
                }
                out.push('\n');
            }
            Role::System => {}
        }
    }
    out
}

/// Summarize the flattened transcript via a dedicated non-tool model call
/// on the same retry-capable request path, bounded by its own deadline.
async fn summarize(
    engine: &Engine,
    cancel: &CancellationToken,
    transcript: String,
) -> Option<String> {
    let messages = vec![
        ChatMessage::system(SUMMARY_INSTRUCTION),
        ChatMessage::user(transcript),
    ];
    let summary_cancel = cancel.child_token();

    let result = tokio::time::timeout(
        SUMMARY_TIMEOUT,
        turn::request_with_retry(
            engine,
            &summary_cancel,
            messages,
            Vec::new(),
            &ChatOptions::default(),
        ),
    )
    .await;

    match result {
        Ok(Ok(output)) => Some(output.text),
        Ok(Err(e)) => {
            warn!(error = %e, "context summarization failed");
            None
        }
        Err(_) => {
            warn!("context summarization timed out");
            None
        }
    }
}
