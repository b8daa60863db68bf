//! Chat transport trait and the OpenAI-compatible implementation.

pub mod http;
pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ChatMessage, StreamDelta};

pub use openai::OpenAiCompatClient;

/// A request for one streamed model turn.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// Tool declaration sent to the model. `parameters` is an opaque JSON
/// Schema blob passed through unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Transport over an OpenAI-compatible streaming chat API.
///
/// Implementations open one streamed completion request and yield
/// incremental [`StreamDelta`] fragments until the stream ends.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta>>>;
}
