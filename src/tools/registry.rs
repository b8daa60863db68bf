//! Tool registry: name → handler mapping, trust metadata, and the static
//! alternative-tool suggestion table.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::provider::ToolDefinition;

/// Cancellation-aware execution context handed to every tool handler.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub cancel: CancellationToken,
}

/// Async tool handler: receives the raw argument blob, returns result text.
pub type ToolHandler = Arc<
    dyn Fn(ToolContext, String) -> futures::future::BoxFuture<'static, Result<String>>
        + Send
        + Sync,
>;

/// One registered tool.
#[derive(Clone)]
pub struct ToolRegistration {
    pub description: String,
    /// Opaque JSON Schema blob passed through to the model.
    pub parameters: serde_json::Value,
    pub handler: ToolHandler,
    /// Safe tools are exempt from the approval gate.
    pub safe: bool,
}

impl std::fmt::Debug for ToolRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistration")
            .field("description", &self.description)
            .field("safe", &self.safe)
            .finish_non_exhaustive()
    }
}

/// Tools known to overlap in capability; appended to error results so the
/// model can self-correct without a further round-trip.
const ALTERNATIVES: &[(&str, &[&str])] = &[
    ("web_search", &["fetch_url"]),
    ("fetch_url", &["web_search"]),
    ("read_file", &["list_files", "glob", "search_files"]),
    ("edit_file", &["write_file", "read_file"]),
    ("write_file", &["edit_file"]),
    ("delete_file", &["list_files"]),
    ("list_files", &["glob", "search_files"]),
    ("glob", &["list_files", "search_files"]),
    ("search_files", &["glob", "read_file"]),
    ("run_command", &["read_file", "write_file"]),
];

/// Holds the set of callable tools. Registration order is preserved so the
/// declarations sent to the model are deterministic.
#[derive(Clone, Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolRegistration>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Re-registering a name overwrites the prior entry
    /// and keeps its original position.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        handler: ToolHandler,
        safe: bool,
    ) {
        let name = name.into();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(
            name,
            ToolRegistration {
                description: description.into(),
                parameters,
                handler,
                safe,
            },
        );
    }

    /// Register a tool from an async closure.
    pub fn register_fn<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        f: F,
        safe: bool,
    ) where
        F: Fn(ToolContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        let handler: ToolHandler = Arc::new(move |ctx, args| Box::pin(f(ctx, args)));
        self.register(name, description, parameters, handler, safe);
    }

    pub fn get(&self, name: &str) -> Option<&ToolRegistration> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Tool declarations for the model, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| {
                self.tools.get(name).map(|reg| ToolDefinition {
                    name: name.clone(),
                    description: reg.description.clone(),
                    parameters: reg.parameters.clone(),
                })
            })
            .collect()
    }

    /// Suggestion suffix listing registered alternatives for a tool, e.g.
    /// `" (alternatives: glob, read_file)"`. Empty when none apply.
    pub fn alternatives_suffix(&self, name: &str) -> String {
        let Some((_, alts)) = ALTERNATIVES.iter().find(|(n, _)| *n == name) else {
            return String::new();
        };
        let available: Vec<&str> = alts
            .iter()
            .copied()
            .filter(|alt| self.tools.contains_key(*alt))
            .collect();
        if available.is_empty() {
            return String::new();
        }
        format!(" (alternatives: {})", available.join(", "))
    }
}
