//! Session persistence: one message log per working directory, stored
//! under `<config_dir>/sessions/`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::types::{ChatMessage, Role};

const MAX_SESSION_MESSAGES: usize = 100;

#[derive(Debug, Serialize, Deserialize)]
struct SessionData {
    dir: String,
    updated_at: String,
    messages: Vec<ChatMessage>,
}

fn sessions_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("sessions")
}

fn session_file_path(config_dir: &Path, work_dir: &str) -> PathBuf {
    let digest = Sha256::digest(work_dir.as_bytes());
    let mut name = String::with_capacity(37);
    for byte in &digest[..16] {
        name.push_str(&format!("{byte:02x}"));
    }
    name.push_str(".json");
    sessions_dir(config_dir).join(name)
}

/// Persist the log for `work_dir`. The system message is filtered out, at
/// most the most recent 100 messages are kept, and leading non-user
/// messages after truncation are dropped so the log always resumes at a
/// user boundary.
pub fn save_session(config_dir: &Path, work_dir: &str, messages: &[ChatMessage]) -> Result<()> {
    let filtered: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();
    if filtered.is_empty() {
        return Ok(());
    }

    let truncated = truncate_messages(filtered, MAX_SESSION_MESSAGES);

    let data = SessionData {
        dir: work_dir.to_string(),
        updated_at: chrono::Utc::now().to_rfc3339(),
        messages: truncated,
    };

    std::fs::create_dir_all(sessions_dir(config_dir))?;
    let json = serde_json::to_vec_pretty(&data)?;
    std::fs::write(session_file_path(config_dir, work_dir), json)?;
    Ok(())
}

/// Load the prior log for `work_dir`; empty when no session exists.
pub fn load_session(config_dir: &Path, work_dir: &str) -> Result<Vec<ChatMessage>> {
    let path = session_file_path(config_dir, work_dir);
    let bytes = match std::fs::read(&path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let data: SessionData = serde_json::from_slice(&bytes)?;
    Ok(data.messages)
}

/// Remove the stored session for `work_dir`, if any.
pub fn clear_session(config_dir: &Path, work_dir: &str) -> Result<()> {
    match std::fs::remove_file(session_file_path(config_dir, work_dir)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn truncate_messages(mut msgs: Vec<ChatMessage>, max: usize) -> Vec<ChatMessage> {
    if msgs.len() > max {
        msgs.drain(..msgs.len() - max);
    }
    let keep_from = msgs
        .iter()
        .position(|m| m.role == Role::User)
        .unwrap_or(msgs.len());
    msgs.drain(..keep_from);
    msgs
}
