//! Interactive surface: a thin prompt/read/chat loop with Ctrl-C
//! handling and a terminal approval prompt.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::engine::{ChatOptions, Engine, ToolApprover};
use crate::error::Result;
use crate::session;
use crate::types::ChatMessage;

const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Two Ctrl-C presses within this window exit the program.
const EXIT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Approver that asks on the terminal (y/N). `--yes` bypasses it by not
/// configuring any approver at all.
pub struct TerminalApprover;

#[async_trait]
impl ToolApprover for TerminalApprover {
    async fn approve(&self, tool_name: &str, arguments: &str) -> Result<bool> {
        let prompt = format!("{YELLOW}Allow tool {tool_name}({arguments})? [y/N] {RESET}");
        let answer = tokio::task::spawn_blocking(move || {
            eprint!("{prompt}");
            let _ = std::io::stderr().flush();
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await
        .map_err(|e| crate::error::TernError::Stream(e.to_string()))??;

        let answer = answer.trim().to_lowercase();
        Ok(answer == "y" || answer == "yes")
    }
}

pub struct ReplSettings {
    pub skill: String,
    pub autonomous: bool,
    pub quiet: bool,
    pub config_dir: Option<PathBuf>,
    pub work_dir: String,
    pub resume: bool,
}

fn chat_options(settings: &ReplSettings) -> ChatOptions {
    let quiet = settings.quiet;
    let mut opts = ChatOptions::new()
        .with_skill(settings.skill.clone())
        .with_autonomous(settings.autonomous)
        .with_on_content(|text| {
            print!("{text}");
            let _ = std::io::stdout().flush();
        })
        .with_on_reasoning(move |text| {
            if !quiet {
                eprint!("{DIM}{text}{RESET}");
            }
        });
    if !quiet {
        opts = opts
            .with_on_tool_call(|name, arguments| {
                eprintln!("{YELLOW}[tool: {name}({arguments})]{RESET}");
            })
            .with_on_tool_error(|name, err| {
                eprintln!("{RED}[tool {name} failed: {err}]{RESET}");
            })
            .with_on_compressed(|chars| {
                eprintln!("{YELLOW}[context compressed: {chars} chars]{RESET}");
            });
    }
    opts
}

/// Run one chat call under a fresh cancellation token. The first Ctrl-C
/// cancels the in-flight turn; a second within the debounce window exits.
/// Returns the updated log, or `None` when the user asked to exit.
async fn run_one_turn(
    engine: &Arc<Engine>,
    messages: Vec<ChatMessage>,
    opts: &ChatOptions,
    quiet: bool,
) -> Option<Vec<ChatMessage>> {
    let cancel = CancellationToken::new();
    let chat = engine.chat(cancel.clone(), messages, opts);
    tokio::pin!(chat);

    let mut last_interrupt: Option<tokio::time::Instant> = None;
    let outcome = loop {
        tokio::select! {
            outcome = &mut chat => break outcome,
            signal = tokio::signal::ctrl_c() => {
                if signal.is_err() {
                    continue;
                }
                let now = tokio::time::Instant::now();
                if let Some(prev) = last_interrupt {
                    if now.duration_since(prev) < EXIT_DEBOUNCE {
                        return None;
                    }
                }
                last_interrupt = Some(now);
                cancel.cancel();
                if !quiet {
                    eprintln!("\n{YELLOW}[interrupted; press Ctrl-C again to exit]{RESET}");
                }
            }
        }
    };

    if let Some(err) = outcome.error {
        if err.is_interruption() || cancel.is_cancelled() {
            if !quiet {
                eprintln!("{YELLOW}[turn interrupted]{RESET}");
            }
        } else {
            eprintln!("{RED}Error: {err}{RESET}");
        }
    }
    Some(outcome.messages)
}

/// Run a single prompt non-interactively (piped stdin or argv prompt).
pub async fn run_oneshot(engine: Arc<Engine>, prompt: String, settings: ReplSettings) -> Result<()> {
    let opts = chat_options(&settings);
    let messages = vec![ChatMessage::user(prompt)];
    if let Some(messages) = run_one_turn(&engine, messages, &opts, settings.quiet).await {
        save(&settings, &messages);
    }
    println!();
    Ok(())
}

/// The interactive loop: prompt, read a line, run a chat call, repeat.
pub async fn run_repl(engine: Arc<Engine>, settings: ReplSettings) -> Result<()> {
    let mut messages: Vec<ChatMessage> = if settings.resume {
        match &settings.config_dir {
            Some(dir) => session::load_session(dir, &settings.work_dir)?,
            None => Vec::new(),
        }
    } else {
        Vec::new()
    };

    let opts = chat_options(&settings);

    if !settings.quiet {
        eprintln!("tern [{}] (type 'exit' to quit)", engine.model());
        eprintln!();
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" {
            break;
        }

        messages.push(ChatMessage::user(input));
        let Some(updated) = run_one_turn(&engine, messages, &opts, settings.quiet).await else {
            break;
        };
        messages = updated;
        println!();

        save(&settings, &messages);
    }
    Ok(())
}

fn save(settings: &ReplSettings, messages: &[ChatMessage]) {
    if let Some(dir) = &settings.config_dir {
        if let Err(e) = session::save_session(dir, &settings.work_dir, messages) {
            tracing::warn!(error = %e, "failed to save session");
        }
    }
}
