//! Tern, an interactive command-line agent for OpenAI-compatible chat
//! APIs.
//!
//! The core is the conversation engine: it streams model responses,
//! assembles fragmented tool-call deltas, executes tools concurrently
//! (with optional approval gating), feeds results back into the
//! conversation, retries transient failures, and compresses growing
//! context via summarization, all while remaining cancellable mid-stream.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tern::config::EngineConfig;
//! use tern::engine::{ChatOptions, Engine};
//! use tern::provider::OpenAiCompatClient;
//! use tern::types::ChatMessage;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let transport = Arc::new(OpenAiCompatClient::new("sk-...", "https://api.openai.com/v1"));
//! let engine = Engine::new(transport, "gpt-4o-mini", EngineConfig::default());
//! let outcome = engine
//!     .chat(
//!         CancellationToken::new(),
//!         vec![ChatMessage::user("Hello!")],
//!         &ChatOptions::default(),
//!     )
//!     .await;
//! println!("{}", outcome.text);
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod memory;
pub mod provider;
pub mod repl;
pub mod session;
pub mod stdio;
pub mod tools;
pub mod types;

pub use engine::{ChatOptions, ChatOutcome, Engine, ToolApprover};
pub use error::{Result, TernError};
pub use types::{ChatMessage, Role, ToolCallRequest};
