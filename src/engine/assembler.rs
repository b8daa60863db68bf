//! Stream assembly: fold one turn's incremental fragments into full text
//! plus a set of complete, ordered tool-call requests.

use std::collections::BTreeMap;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TernError};
use crate::types::{FinishReason, StreamDelta, ToolCallRequest};

use super::turn::TurnOutput;
use super::ChatOptions;

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Consume a turn's fragment stream. Content deltas are appended to the
/// text and forwarded to the observer immediately; reasoning deltas are
/// only forwarded. Tool-call fragments accumulate per position index and
/// must not be read until the stream ends.
///
/// Tool calls are emitted only when the terminal finish reason says the
/// model requested them; otherwise partial records are discarded and the
/// turn is treated as text-only. A transport error aborts assembly and the
/// caller decides whether to retry the whole turn.
pub(crate) async fn assemble(
    stream: BoxStream<'static, Result<StreamDelta>>,
    cancel: &CancellationToken,
    opts: &ChatOptions,
) -> Result<TurnOutput> {
    let mut stream = stream;
    let mut text = String::new();
    let mut partial: BTreeMap<usize, PartialToolCall> = BTreeMap::new();
    let mut finish: Option<FinishReason> = None;

    loop {
        let delta = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TernError::Interrupted),
            item = stream.next() => match item {
                None => break,
                Some(Err(e)) => return Err(e),
                Some(Ok(delta)) => delta,
            },
        };

        if let Some(reasoning) = delta.reasoning.as_deref() {
            if !reasoning.is_empty() {
                if let Some(cb) = &opts.on_reasoning {
                    cb(reasoning);
                }
            }
        }

        if let Some(content) = delta.content.as_deref() {
            if !content.is_empty() {
                if let Some(cb) = &opts.on_content {
                    cb(content);
                }
                text.push_str(content);
            }
        }

        for tc in &delta.tool_calls {
            let record = partial.entry(tc.index.unwrap_or(0)).or_default();
            if let Some(id) = tc.id.as_deref() {
                if !id.is_empty() {
                    record.id = id.to_string();
                }
            }
            if let Some(name) = tc.name.as_deref() {
                record.name.push_str(name);
            }
            if let Some(arguments) = tc.arguments.as_deref() {
                record.arguments.push_str(arguments);
            }
        }

        if let Some(reason) = delta.finish_reason {
            finish = Some(reason);
        }
    }

    let tool_calls = if finish == Some(FinishReason::ToolCalls) {
        partial
            .into_values()
            .map(|p| ToolCallRequest {
                id: p.id,
                name: p.name,
                arguments: p.arguments,
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(TurnOutput { text, tool_calls })
}
