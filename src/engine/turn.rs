//! One model turn with bounded exponential-backoff retry.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Result, TernError};
use crate::provider::{ChatRequest, ToolDefinition};
use crate::types::{ChatMessage, Role, ToolCallRequest};

use super::{assembler, ChatOptions, Engine};

/// The transient output of one model round.
#[derive(Debug)]
pub(crate) struct TurnOutput {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Run one primary turn: prepend the configured system message when the
/// log does not already start with one, declare the live toolset, and
/// request with retry.
pub(crate) async fn run_turn(
    engine: &Engine,
    cancel: &CancellationToken,
    messages: &[ChatMessage],
    opts: &ChatOptions,
) -> Result<TurnOutput> {
    let system_text = engine
        .system_message
        .as_ref()
        .map(|f| f(&opts.skill))
        .unwrap_or_default();

    let has_system = messages
        .first()
        .map(|m| m.role == Role::System)
        .unwrap_or(false);

    let mut full = Vec::with_capacity(messages.len() + 1);
    if !system_text.is_empty() && !has_system {
        full.push(ChatMessage::system(system_text));
    }
    full.extend_from_slice(messages);

    let tools = engine.registry().definitions();
    request_with_retry(engine, cancel, full, tools, opts).await
}

/// Execute exactly one model turn with automatic retry: up to
/// `max_retries` retries with exponential backoff doubling from a 1-second
/// base. Cancellation is checked before each wait and before each attempt;
/// an already-cancelled context returns the last observed error so callers
/// can distinguish a user interrupt from retry exhaustion. Both
/// connection-establishment and stream-assembly failures count as
/// retryable attempts.
pub(crate) async fn request_with_retry(
    engine: &Engine,
    cancel: &CancellationToken,
    messages: Vec<ChatMessage>,
    tools: Vec<ToolDefinition>,
    opts: &ChatOptions,
) -> Result<TurnOutput> {
    let max_retries = engine.config.max_retries;
    let mut last_err: Option<TernError> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            if cancel.is_cancelled() {
                return Err(last_err.unwrap_or(TernError::Interrupted));
            }
            let wait = Duration::from_secs(1u64 << (attempt - 1).min(31));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(last_err.unwrap_or(TernError::Interrupted));
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        let (transport, model) = {
            let state = engine.state();
            (Arc::clone(&state.transport), state.model.clone())
        };
        let request = ChatRequest {
            model,
            messages: messages.clone(),
            tools: tools.clone(),
        };

        let stream = match transport.stream_chat(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(attempt, error = %e, "chat request failed");
                last_err = Some(e);
                continue;
            }
        };

        match assembler::assemble(stream, cancel, opts).await {
            Ok(output) => return Ok(output),
            Err(e) => {
                warn!(attempt, error = %e, "stream assembly failed");
                last_err = Some(e);
                continue;
            }
        }
    }

    Err(TernError::RetriesExhausted {
        retries: max_retries,
        source: Box::new(last_err.unwrap_or(TernError::Interrupted)),
    })
}
