//! OpenAI-compatible Chat Completions transport.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, TernError};
use crate::types::{FinishReason, Role, StreamDelta, ToolCallDelta};

use super::http::{bearer_headers, parse_sse_data, shared_client, status_to_error};
use super::{ChatRequest, ChatTransport};

/// Client for any endpoint speaking the OpenAI chat-completions protocol.
pub struct OpenAiCompatClient {
    api_key: String,
    base_url: String,
}

impl OpenAiCompatClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn build_request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let messages = request
            .messages
            .iter()
            .map(message_to_wire)
            .collect::<Vec<_>>();

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
        });

        if !request.tools.is_empty() {
            let tool_defs: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = tool_defs.into();
        }

        body
    }
}

#[async_trait]
impl ChatTransport for OpenAiCompatClient {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta>>> {
        let body = self.build_request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %request.model, "streaming chat completion");

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(TernError::Network(e));
                        break;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    if let Some(data) = parse_sse_data(&line) {
                        match serde_json::from_str::<WireChunk>(data) {
                            Ok(chunk) => {
                                if let Some(delta) = chunk_to_delta(chunk) {
                                    yield Ok(delta);
                                }
                            }
                            Err(_) => {} // skip unparseable chunks
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn chunk_to_delta(chunk: WireChunk) -> Option<StreamDelta> {
    let choice = chunk.choices.into_iter().next()?;

    let tool_calls = choice
        .delta
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let function = tc.function.unwrap_or_default();
            ToolCallDelta {
                index: tc.index,
                id: tc.id,
                name: function.name,
                arguments: function.arguments,
            }
        })
        .collect();

    Some(StreamDelta {
        content: choice.delta.content,
        reasoning: choice.delta.reasoning_content,
        tool_calls,
        finish_reason: choice
            .finish_reason
            .as_deref()
            .and_then(FinishReason::parse),
    })
}

fn message_to_wire(msg: &crate::types::ChatMessage) -> serde_json::Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    if let Some(ref tool_call_id) = msg.tool_call_id {
        return serde_json::json!({
            "role": role,
            "content": msg.content,
            "tool_call_id": tool_call_id,
        });
    }

    if !msg.tool_calls.is_empty() {
        let tc_json: Vec<serde_json::Value> = msg
            .tool_calls
            .iter()
            .map(|tc| {
                serde_json::json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {
                        "name": tc.name,
                        "arguments": tc.arguments,
                    }
                })
            })
            .collect();
        return serde_json::json!({
            "role": role,
            "content": if msg.content.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::Value::String(msg.content.clone())
            },
            "tool_calls": tc_json,
        });
    }

    serde_json::json!({ "role": role, "content": msg.content })
}

// Wire chunk types (internal)

#[derive(Deserialize)]
struct WireChunk {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    delta: WireDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireDelta {
    content: Option<String>,
    #[serde(alias = "reasoning")]
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Deserialize)]
struct WireToolCallDelta {
    index: Option<usize>,
    id: Option<String>,
    function: Option<WireFunctionDelta>,
}

#[derive(Deserialize, Default)]
struct WireFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}
