//! Conversation orchestration engine.
//!
//! Drives the full multi-turn loop: compress context, request one streamed
//! model turn, execute any tool calls concurrently, feed results back, and
//! repeat until the model produces a final text answer (or the autonomous
//! iteration cap is reached).

mod assembler;
mod compress;
mod executor;
mod turn;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{Result, TernError};
use crate::provider::ChatTransport;
use crate::tools::{ToolHandler, ToolRegistry};
use crate::types::ChatMessage;

/// Supplies the system message for a turn, given the active skill name.
/// An empty return suppresses the system message.
pub type SystemMessageFn = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Decides whether a non-safe tool invocation may proceed. Scope and
/// persistence of approval decisions belong to the implementation.
#[async_trait]
pub trait ToolApprover: Send + Sync {
    async fn approve(&self, tool_name: &str, arguments: &str) -> Result<bool>;
}

pub type TextCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type PairCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;
pub type CountCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// Per-call options: skill selection, autonomous mode, and observer
/// callbacks. Observers are advisory and never affect control flow.
#[derive(Clone, Default)]
pub struct ChatOptions {
    pub skill: String,
    pub autonomous: bool,
    pub(crate) on_content: Option<TextCallback>,
    pub(crate) on_reasoning: Option<TextCallback>,
    pub(crate) on_tool_call: Option<PairCallback>,
    pub(crate) on_tool_result: Option<PairCallback>,
    pub(crate) on_tool_error: Option<PairCallback>,
    pub(crate) on_compressed: Option<CountCallback>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skill(mut self, skill: impl Into<String>) -> Self {
        self.skill = skill.into();
        self
    }

    pub fn with_autonomous(mut self, autonomous: bool) -> Self {
        self.autonomous = autonomous;
        self
    }

    /// Observe content deltas as they stream.
    pub fn with_on_content<F: Fn(&str) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_content = Some(Arc::new(f));
        self
    }

    /// Observe reasoning deltas; these never become part of the final text.
    pub fn with_on_reasoning<F: Fn(&str) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_reasoning = Some(Arc::new(f));
        self
    }

    /// Observe each tool call start: `(name, arguments)`.
    pub fn with_on_tool_call<F: Fn(&str, &str) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_tool_call = Some(Arc::new(f));
        self
    }

    /// Observe each successful tool result: `(name, result)`.
    pub fn with_on_tool_result<F: Fn(&str, &str) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_tool_result = Some(Arc::new(f));
        self
    }

    /// Observe each failed tool call: `(name, error text)`.
    pub fn with_on_tool_error<F: Fn(&str, &str) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_tool_error = Some(Arc::new(f));
        self
    }

    /// Observe context compression with the pre-compression char count.
    pub fn with_on_compressed<F: Fn(usize) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_compressed = Some(Arc::new(f));
        self
    }
}

/// Result of one `chat` call: the final assistant text, the full updated
/// log, and the error that aborted the loop, if any. On error the log
/// still contains every message appended before the failure, so partially
/// completed tool turns are not lost.
#[derive(Debug)]
pub struct ChatOutcome {
    pub text: String,
    pub messages: Vec<ChatMessage>,
    pub error: Option<TernError>,
}

struct SharedState {
    transport: Arc<dyn ChatTransport>,
    model: String,
    registry: Arc<ToolRegistry>,
}

/// The conversation engine. Holds the swappable transport/model/registry
/// triple behind a single mutex; one instance serves a whole session and
/// is reentrant across conversations.
pub struct Engine {
    shared: Mutex<SharedState>,
    system_message: Option<SystemMessageFn>,
    approver: Option<Arc<dyn ToolApprover>>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        model: impl Into<String>,
        config: EngineConfig,
    ) -> Self {
        Self {
            shared: Mutex::new(SharedState {
                transport,
                model: model.into(),
                registry: Arc::new(ToolRegistry::new()),
            }),
            system_message: None,
            approver: None,
            config: config.normalized(),
        }
    }

    pub fn with_system_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.system_message = Some(Box::new(f));
        self
    }

    pub fn with_approver(mut self, approver: Arc<dyn ToolApprover>) -> Self {
        self.approver = Some(approver);
        self
    }

    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.state().registry = Arc::new(registry);
        self
    }

    fn state(&self) -> MutexGuard<'_, SharedState> {
        self.shared.lock().expect("engine state lock poisoned")
    }

    pub fn model(&self) -> String {
        self.state().model.clone()
    }

    pub fn set_model(&self, model: impl Into<String>) {
        self.state().model = model.into();
    }

    pub fn set_transport(&self, transport: Arc<dyn ChatTransport>) {
        self.state().transport = transport;
    }

    /// Snapshot of the live tool registry.
    pub fn registry(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.state().registry)
    }

    /// Swap the tool registry wholesale.
    pub fn set_registry(&self, registry: ToolRegistry) {
        self.state().registry = Arc::new(registry);
    }

    /// Register a tool on the live registry. Re-registering a name
    /// overwrites the prior entry.
    pub fn register_tool(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        handler: ToolHandler,
        safe: bool,
    ) {
        let mut state = self.state();
        let mut registry = (*state.registry).clone();
        registry.register(name, description, parameters, handler, safe);
        state.registry = Arc::new(registry);
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.state().registry.contains(name)
    }

    /// Invoke a single tool directly, bypassing the conversation loop.
    /// Errors are absorbed into the returned text, exactly as they would
    /// be when fed back to the model.
    pub async fn execute_tool(
        &self,
        cancel: CancellationToken,
        name: &str,
        arguments: &str,
    ) -> String {
        let registry = self.registry();
        let approver = self.approver.clone();
        executor::execute_single(registry, approver, cancel, name, arguments)
            .await
            .0
    }

    /// Run the conversation loop until the model produces a final text
    /// answer, a hard error occurs, or (in autonomous mode) the iteration
    /// cap is reached. The cap is a soft stop, not an error.
    pub async fn chat(
        &self,
        cancel: CancellationToken,
        messages: Vec<ChatMessage>,
        opts: &ChatOptions,
    ) -> ChatOutcome {
        let mut messages = messages;
        let mut iteration: u32 = 0;

        loop {
            iteration += 1;
            if opts.autonomous && iteration > self.config.max_autonomous_iterations {
                debug!(
                    iterations = iteration - 1,
                    "autonomous iteration cap reached"
                );
                return ChatOutcome {
                    text: String::new(),
                    messages,
                    error: None,
                };
            }

            messages = compress::compress_context(self, &cancel, messages, opts).await;

            let turn = match turn::run_turn(self, &cancel, &messages, opts).await {
                Ok(turn) => turn,
                Err(e) => {
                    return ChatOutcome {
                        text: String::new(),
                        messages,
                        error: Some(e),
                    };
                }
            };

            if !turn.tool_calls.is_empty() {
                // Protocol ordering: the assistant message carrying the
                // requests must precede the tool results.
                messages.push(ChatMessage::assistant_tool_calls(turn.tool_calls.clone()));
                let results = executor::execute_batch(self, &cancel, &turn.tool_calls, opts).await;
                messages.extend(results);
                continue;
            }

            messages.push(ChatMessage::assistant(turn.text.clone()));
            return ChatOutcome {
                text: turn.text,
                messages,
                error: None,
            };
        }
    }
}
