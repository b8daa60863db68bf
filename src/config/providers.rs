//! Built-in table of OpenAI-compatible providers, with a user overlay.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One OpenAI-compatible endpoint with its default model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provider {
    pub name: String,
    #[serde(rename = "apiurl")]
    pub api_url: String,
    #[serde(default)]
    pub model: String,
    #[serde(rename = "envKey", default, skip_serializing_if = "String::is_empty")]
    pub env_key: String,
}

impl Provider {
    fn new(name: &str, api_url: &str, model: &str, env_key: &str) -> Self {
        Self {
            name: name.to_string(),
            api_url: api_url.to_string(),
            model: model.to_string(),
            env_key: env_key.to_string(),
        }
    }

    /// Find a provider by name.
    pub fn find<'a>(name: &str, providers: &'a [Provider]) -> Option<&'a Provider> {
        providers.iter().find(|p| p.name == name)
    }
}

/// The built-in provider table.
pub fn default_providers() -> Vec<Provider> {
    vec![
        Provider::new(
            "openai",
            "https://api.openai.com/v1",
            "gpt-4o-mini",
            "OPENAI_API_KEY",
        ),
        Provider::new(
            "google",
            "https://generativelanguage.googleapis.com/v1beta/openai",
            "gemini-2.0-flash",
            "GEMINI_API_KEY",
        ),
        Provider::new(
            "anthropic",
            "https://api.anthropic.com/v1",
            "claude-sonnet-4-20250514",
            "ANTHROPIC_API_KEY",
        ),
        Provider::new(
            "deepseek",
            "https://api.deepseek.com/v1",
            "deepseek-chat",
            "DEEPSEEK_API_KEY",
        ),
        Provider::new(
            "mistral",
            "https://api.mistral.ai/v1",
            "mistral-small-latest",
            "MISTRAL_API_KEY",
        ),
        Provider::new(
            "groq",
            "https://api.groq.com/openai/v1",
            "llama-3.3-70b-versatile",
            "GROQ_API_KEY",
        ),
        Provider::new("xai", "https://api.x.ai/v1", "grok-3-mini", "XAI_API_KEY"),
        Provider::new(
            "perplexity",
            "https://api.perplexity.ai",
            "sonar",
            "PERPLEXITY_API_KEY",
        ),
        Provider::new(
            "together",
            "https://api.together.xyz/v1",
            "meta-llama/Llama-3.3-70B-Instruct-Turbo",
            "TOGETHER_API_KEY",
        ),
        Provider::new(
            "openrouter",
            "https://openrouter.ai/api/v1",
            "openrouter/auto",
            "OPENROUTER_API_KEY",
        ),
    ]
}

/// Load the provider table: defaults overlaid by `providers.json` in the
/// config directory (entries replace same-named defaults or extend the
/// table).
pub fn load_providers(config_dir: &Path) -> Result<Vec<Provider>> {
    let mut providers = default_providers();

    let path = config_dir.join("providers.json");
    let bytes = match std::fs::read(&path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(providers),
        Err(e) => return Err(e.into()),
    };
    let extra: Vec<Provider> = serde_json::from_slice(&bytes)?;

    for provider in extra {
        if let Some(existing) = providers.iter_mut().find(|p| p.name == provider.name) {
            *existing = provider;
        } else {
            providers.push(provider);
        }
    }
    Ok(providers)
}
