//! Concurrent tool execution for one turn's batch of tool-call requests.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{ChatMessage, ToolCallRequest};

use super::{ChatOptions, Engine, ToolApprover};

/// Execute every call in the batch concurrently and return tool-result
/// messages in the same order as the requests, regardless of completion
/// order. The batch completes only when every call has finished; tools are
/// expected to honor the cancellation context.
pub(crate) async fn execute_batch(
    engine: &Engine,
    cancel: &CancellationToken,
    calls: &[ToolCallRequest],
    opts: &ChatOptions,
) -> Vec<ChatMessage> {
    let registry = engine.registry();
    let approver = engine.approver.clone();

    let mut handles = Vec::with_capacity(calls.len());
    for call in calls {
        if let Some(cb) = &opts.on_tool_call {
            cb(&call.name, &call.arguments);
        }
        debug!(tool = %call.name, id = %call.id, "executing tool call");

        let registry = Arc::clone(&registry);
        let approver = approver.clone();
        let cancel = cancel.clone();
        let name = call.name.clone();
        let arguments = call.arguments.clone();
        handles.push(tokio::spawn(async move {
            execute_single(registry, approver, cancel, &name, &arguments).await
        }));
    }

    let mut results = Vec::with_capacity(calls.len());
    for (call, handle) in calls.iter().zip(handles) {
        let (output, is_error) = match handle.await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool task failed");
                (format!("Error: tool task failed: {e}"), true)
            }
        };

        if is_error {
            if let Some(cb) = &opts.on_tool_error {
                cb(&call.name, &output);
            }
        } else if let Some(cb) = &opts.on_tool_result {
            cb(&call.name, &output);
        }

        results.push(ChatMessage::tool_result(call.id.clone(), output));
    }
    results
}

/// Resolve and run one tool call. Every failure mode becomes result text
/// fed back to the model: unknown tool, approval denial, and handler
/// errors (the latter suffixed with alternative-tool suggestions). The
/// returned flag marks error results.
pub(crate) async fn execute_single(
    registry: Arc<ToolRegistry>,
    approver: Option<Arc<dyn ToolApprover>>,
    cancel: CancellationToken,
    name: &str,
    arguments: &str,
) -> (String, bool) {
    let Some(registration) = registry.get(name) else {
        return (format!("Unknown tool: {name}"), true);
    };

    if !registration.safe {
        if let Some(approver) = &approver {
            match approver.approve(name, arguments).await {
                Ok(true) => {}
                Ok(false) => return ("Error: Tool not approved by user".to_string(), true),
                Err(e) => return (format!("Error: approval failed: {e}"), true),
            }
        }
    }

    let ctx = ToolContext { cancel };
    match (registration.handler)(ctx, arguments.to_string()).await {
        Ok(output) => (output, false),
        Err(e) => (
            format!("Error: {e}{}", registry.alternatives_suffix(name)),
            true,
        ),
    }
}
