//! Tool registry and built-in tools.

pub mod builtin;
pub mod registry;

pub use registry::{ToolContext, ToolHandler, ToolRegistration, ToolRegistry};
