//! Core data types: conversation messages and streaming deltas.

pub mod message;
pub mod stream;

pub use message::{ChatMessage, Role, ToolCallRequest};
pub use stream::{FinishReason, StreamDelta, ToolCallDelta};
