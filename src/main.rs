use std::io::{IsTerminal, Read};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tern::config::{self, EngineConfig, Provider};
use tern::engine::Engine;
use tern::error::{Result, TernError};
use tern::identity::Identity;
use tern::memory::MemoryStore;
use tern::provider::OpenAiCompatClient;
use tern::repl::{self, ReplSettings, TerminalApprover};
use tern::tools::{builtin, ToolRegistry};

/// Interactive command-line agent for OpenAI-compatible chat APIs.
#[derive(Parser, Debug)]
#[command(name = "tern", version, about)]
struct Cli {
    /// Provider name or provider/model (e.g. "openai" or "groq/llama-3.3-70b")
    #[arg(long, default_value = "openai")]
    model: String,

    /// API key (overrides the provider's environment variable)
    #[arg(long)]
    key: Option<String>,

    /// Skill prompt to activate for this session
    #[arg(long, default_value = "")]
    skill: String,

    /// Run unattended: skip approval and cap the loop at the configured
    /// iteration limit
    #[arg(long)]
    autonomous: bool,

    /// List available providers and exit
    #[arg(long)]
    list: bool,

    /// Speak the line-delimited JSON batch protocol on stdin/stdout
    #[arg(long)]
    stdio: bool,

    /// Resume the saved session for the current working directory
    #[arg(long)]
    resume: bool,

    /// Suppress informational messages
    #[arg(long)]
    quiet: bool,

    /// Approve every tool invocation without prompting
    #[arg(long)]
    yes: bool,

    /// One-shot prompt; when omitted, reads stdin or starts the REPL
    #[arg(trailing_var_arg = true)]
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = config::config_dir();

    let providers = match &config_dir {
        Some(dir) => config::load_providers(dir)?,
        None => config::providers::default_providers(),
    };

    if cli.list {
        println!("Available providers:");
        for p in &providers {
            println!("  {:<12} model={:<40} env={}", p.name, p.model, p.env_key);
        }
        return Ok(());
    }

    let (provider_name, model_override) = match cli.model.split_once('/') {
        Some((name, model)) => (name, Some(model)),
        None => (cli.model.as_str(), None),
    };
    let provider = Provider::find(provider_name, &providers).ok_or_else(|| {
        let names: Vec<&str> = providers.iter().map(|p| p.name.as_str()).collect();
        TernError::UnknownProvider(format!(
            "{provider_name} (available: {})",
            names.join(", ")
        ))
    })?;

    let api_key = match cli.key {
        Some(key) => key,
        None => std::env::var(&provider.env_key).map_err(|_| {
            TernError::Authentication(format!(
                "{} environment variable or --key flag is required",
                provider.env_key
            ))
        })?,
    };

    let model = model_override.unwrap_or(&provider.model).to_string();
    let transport = Arc::new(OpenAiCompatClient::new(api_key, provider.api_url.clone()));

    let mut registry = ToolRegistry::new();
    let (identity, memory) = match &config_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let memory = Arc::new(MemoryStore::load(dir)?);
            builtin::register_all(&mut registry, Arc::clone(&memory));
            (Identity::load(dir, None)?, Some(memory))
        }
        None => (Identity::default(), None),
    };

    let mut engine =
        Engine::new(transport, model, EngineConfig::default()).with_registry(registry);

    let identity = Arc::new(identity);
    if let Some(memory) = memory {
        let identity = Arc::clone(&identity);
        engine = engine.with_system_message(move |skill| {
            identity.system_message(skill, &memory.as_markdown())
        });
    } else {
        let identity = Arc::clone(&identity);
        engine = engine.with_system_message(move |skill| identity.system_message(skill, ""));
    }

    if !cli.yes && !cli.autonomous && !cli.stdio {
        engine = engine.with_approver(Arc::new(TerminalApprover));
    }

    let engine = Arc::new(engine);

    if cli.stdio {
        return tern::stdio::run_stdio_mode(engine).await;
    }

    let work_dir = std::env::current_dir()?.to_string_lossy().into_owned();
    let settings = ReplSettings {
        skill: cli.skill,
        autonomous: cli.autonomous,
        quiet: cli.quiet,
        config_dir,
        work_dir,
        resume: cli.resume,
    };

    let oneshot = if !cli.prompt.is_empty() {
        Some(cli.prompt.join(" "))
    } else if !std::io::stdin().is_terminal() {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    } else {
        None
    };

    match oneshot {
        Some(prompt) => repl::run_oneshot(engine, prompt, settings).await,
        None => repl::run_repl(engine, settings).await,
    }
}
