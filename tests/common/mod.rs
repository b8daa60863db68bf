//! Shared test helpers: a scripted mock transport.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use tern::error::{Result, TernError};
use tern::provider::{ChatRequest, ChatTransport};
use tern::types::{FinishReason, StreamDelta, ToolCallDelta};

/// A mock transport that replays queued turns and records every request.
/// When the queue is exhausted, the optional fallback turn repeats
/// forever (used to model a model that always requests tool calls).
pub struct MockTransport {
    scripts: Mutex<VecDeque<Vec<StreamDelta>>>,
    fallback: Option<Vec<StreamDelta>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a plain text turn.
    pub fn reply_text(self, text: &str) -> Self {
        self.queue(vec![
            StreamDelta::content(text),
            StreamDelta::finish(FinishReason::Stop),
        ])
    }

    /// Queue a tool-call turn with the arguments split into fragments.
    pub fn reply_tool_call(self, id: &str, name: &str, arg_fragments: &[&str]) -> Self {
        let mut deltas = vec![StreamDelta {
            tool_calls: vec![ToolCallDelta {
                index: Some(0),
                id: Some(id.to_string()),
                name: Some(name.to_string()),
                arguments: None,
            }],
            ..Default::default()
        }];
        for fragment in arg_fragments {
            deltas.push(StreamDelta {
                tool_calls: vec![ToolCallDelta {
                    index: Some(0),
                    id: None,
                    name: None,
                    arguments: Some(fragment.to_string()),
                }],
                ..Default::default()
            });
        }
        deltas.push(StreamDelta::finish(FinishReason::ToolCalls));
        self.queue(deltas)
    }

    /// Queue an arbitrary delta sequence.
    pub fn queue(self, deltas: Vec<StreamDelta>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .push_back(deltas);
        self
    }

    /// Repeat a tool-call turn forever once the queue is exhausted.
    pub fn always_tool_call(mut self, id: &str, name: &str, arguments: &str) -> Self {
        self.fallback = Some(vec![
            StreamDelta {
                tool_calls: vec![ToolCallDelta {
                    index: Some(0),
                    id: Some(id.to_string()),
                    name: Some(name.to_string()),
                    arguments: Some(arguments.to_string()),
                }],
                ..Default::default()
            },
            StreamDelta::finish(FinishReason::ToolCalls),
        ]);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta>>> {
        self.requests.lock().unwrap().push(request.clone());

        let script = self.scripts.lock().unwrap().pop_front();
        let deltas = match script {
            Some(deltas) => deltas,
            None => match &self.fallback {
                Some(deltas) => deltas.clone(),
                None => return Err(TernError::Stream("no scripted response left".into())),
            },
        };
        Ok(futures::stream::iter(deltas.into_iter().map(Ok)).boxed())
    }
}
