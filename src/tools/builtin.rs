//! Built-in tools: shell, filesystem, web fetch, and memory.
//!
//! File-mutating and command-executing tools are registered unsafe
//! (approval-gated); read-only and memory tools are safe.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, TernError};
use crate::memory::MemoryStore;
use crate::provider::http::shared_client;
use crate::tools::{ToolContext, ToolRegistry};

const SHELL_OUTPUT_MAX_BYTES: usize = 32_768;
const READ_FILE_MAX_BYTES: usize = 65_536;
const SEARCH_OUTPUT_MAX_BYTES: usize = 32_768;
const FETCH_MAX_BYTES: usize = 65_536;
const SHELL_TIMEOUT: Duration = Duration::from_secs(30);
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let mut cutoff = max_bytes;
    while cutoff > 0 && !s.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    s[..cutoff].to_string()
}

/// Parse a tool's raw argument blob as a JSON object. An empty blob is
/// treated as `{}` so argument-less tools tolerate lazy models.
fn parse_args(tool: &str, arguments: &str) -> Result<serde_json::Value> {
    if arguments.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(arguments)
        .map_err(|e| TernError::InvalidArgument(format!("{tool}: {e}")))
}

fn required_str<'a>(tool: &str, args: &'a serde_json::Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| TernError::InvalidArgument(format!("{tool}: missing '{key}'")))
}

/// Register every built-in tool on the given registry.
pub fn register_all(registry: &mut ToolRegistry, memory: Arc<MemoryStore>) {
    register_run_command(registry);
    register_read_file(registry);
    register_write_file(registry);
    register_list_files(registry);
    register_search_files(registry);
    register_fetch_url(registry);
    register_memory_tools(registry, memory);
}

fn register_run_command(registry: &mut ToolRegistry) {
    registry.register_fn(
        "run_command",
        "Execute a shell command and return its output",
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "The shell command to execute"}
            },
            "required": ["command"]
        }),
        |ctx: ToolContext, arguments: String| async move {
            let args = parse_args("run_command", &arguments)?;
            let command = required_str("run_command", &args, "command")?.to_string();

            let output = tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    return Err(TernError::tool("run_command", "cancelled"));
                }
                res = tokio::time::timeout(
                    SHELL_TIMEOUT,
                    tokio::process::Command::new("sh").arg("-c").arg(&command).output(),
                ) => match res {
                    Ok(Ok(output)) => output,
                    Ok(Err(e)) => return Err(TernError::tool("run_command", e.to_string())),
                    Err(_) => {
                        return Err(TernError::tool(
                            "run_command",
                            format!("command timed out after {}s", SHELL_TIMEOUT.as_secs()),
                        ));
                    }
                },
            };

            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut combined = format!("{stdout}{stderr}");
            let truncated = combined.len() > SHELL_OUTPUT_MAX_BYTES;
            if truncated {
                combined = truncate_utf8(&combined, SHELL_OUTPUT_MAX_BYTES);
                combined.push_str("\n... (truncated)");
            }

            Ok(serde_json::json!({
                "exit_code": output.status.code(),
                "output": combined,
                "truncated": truncated,
            })
            .to_string())
        },
        false,
    );
}

fn register_read_file(registry: &mut ToolRegistry) {
    registry.register_fn(
        "read_file",
        "Read a file's contents as UTF-8 text",
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to the file to read"}
            },
            "required": ["path"]
        }),
        |_ctx: ToolContext, arguments: String| async move {
            let args = parse_args("read_file", &arguments)?;
            let path = required_str("read_file", &args, "path")?.to_string();

            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| TernError::tool("read_file", format!("{path}: {e}")))?;

            let truncated = content.len() > READ_FILE_MAX_BYTES;
            if truncated {
                let mut s = truncate_utf8(&content, READ_FILE_MAX_BYTES);
                s.push_str("\n... (truncated)");
                Ok(s)
            } else {
                Ok(content)
            }
        },
        true,
    );
}

fn register_write_file(registry: &mut ToolRegistry) {
    registry.register_fn(
        "write_file",
        "Write content to a file, creating parent directories if needed",
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to the file to write"},
                "content": {"type": "string", "description": "Content to write to the file"}
            },
            "required": ["path", "content"]
        }),
        |_ctx: ToolContext, arguments: String| async move {
            let args = parse_args("write_file", &arguments)?;
            let path = required_str("write_file", &args, "path")?.to_string();
            let content = required_str("write_file", &args, "content")?.to_string();

            if let Some(parent) = std::path::Path::new(&path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        TernError::tool(
                            "write_file",
                            format!("failed to create directories for {path}: {e}"),
                        )
                    })?;
                }
            }

            let bytes = content.len();
            tokio::fs::write(&path, content)
                .await
                .map_err(|e| TernError::tool("write_file", format!("{path}: {e}")))?;

            Ok(format!("Wrote {bytes} bytes to {path}"))
        },
        false,
    );
}

fn register_list_files(registry: &mut ToolRegistry) {
    registry.register_fn(
        "list_files",
        "List files and directories in a given path",
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to the directory to list"}
            },
            "required": ["path"]
        }),
        |_ctx: ToolContext, arguments: String| async move {
            let args = parse_args("list_files", &arguments)?;
            let path = required_str("list_files", &args, "path")?.to_string();

            let mut read_dir = tokio::fs::read_dir(&path)
                .await
                .map_err(|e| TernError::tool("list_files", format!("{path}: {e}")))?;

            let mut entries = Vec::new();
            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| TernError::tool("list_files", e.to_string()))?
            {
                let metadata = entry
                    .metadata()
                    .await
                    .map_err(|e| TernError::tool("list_files", e.to_string()))?;

                let entry_type = if metadata.is_dir() {
                    "dir"
                } else if metadata.is_file() {
                    "file"
                } else {
                    "other"
                };

                entries.push(serde_json::json!({
                    "name": entry.file_name().to_string_lossy(),
                    "type": entry_type,
                    "size": metadata.len(),
                }));
            }

            entries.sort_by(|a, b| {
                let a_name = a["name"].as_str().unwrap_or("");
                let b_name = b["name"].as_str().unwrap_or("");
                a_name.cmp(b_name)
            });

            Ok(serde_json::json!({ "path": path, "entries": entries }).to_string())
        },
        true,
    );
}

fn register_search_files(registry: &mut ToolRegistry) {
    registry.register_fn(
        "search_files",
        "Search for a pattern in files using grep",
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "The pattern to search for"},
                "path": {"type": "string", "description": "Directory or file to search in (defaults to '.')"}
            },
            "required": ["pattern"]
        }),
        |_ctx: ToolContext, arguments: String| async move {
            let args = parse_args("search_files", &arguments)?;
            let pattern = required_str("search_files", &args, "pattern")?.to_string();
            let path = args
                .get("path")
                .and_then(|v| v.as_str())
                .unwrap_or(".")
                .to_string();

            let output = tokio::process::Command::new("grep")
                .args(["-rn", &pattern, &path])
                .output()
                .await
                .map_err(|e| TernError::tool("search_files", e.to_string()))?;

            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut result = stdout.into_owned();
            if !stderr.is_empty() {
                result.push_str(&stderr);
            }
            if result.is_empty() {
                result.push_str("(no matches)");
            }

            if result.len() > SEARCH_OUTPUT_MAX_BYTES {
                result = truncate_utf8(&result, SEARCH_OUTPUT_MAX_BYTES);
                result.push_str("\n... (truncated)");
            }

            Ok(result)
        },
        true,
    );
}

fn register_fetch_url(registry: &mut ToolRegistry) {
    registry.register_fn(
        "fetch_url",
        "Fetch a URL and return its contents; HTML pages are flattened to text",
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "The URL to fetch"},
                "raw": {"type": "boolean", "description": "Return the raw body without HTML flattening"}
            },
            "required": ["url"]
        }),
        |ctx: ToolContext, arguments: String| async move {
            let args = parse_args("fetch_url", &arguments)?;
            let url = required_str("fetch_url", &args, "url")?.to_string();
            let raw = args.get("raw").and_then(|v| v.as_bool()).unwrap_or(false);

            let fetch = async {
                let resp = shared_client()
                    .get(&url)
                    .timeout(FETCH_TIMEOUT)
                    .send()
                    .await
                    .map_err(|e| TernError::tool("fetch_url", e.to_string()))?;

                let is_html = resp
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|ct| ct.contains("text/html"))
                    .unwrap_or(false);

                let body = resp
                    .text()
                    .await
                    .map_err(|e| TernError::tool("fetch_url", e.to_string()))?;
                Ok::<_, TernError>((body, is_html))
            };

            let (body, is_html) = tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    return Err(TernError::tool("fetch_url", "cancelled"));
                }
                res = fetch => res?,
            };

            let mut text = if !raw && (is_html || body.trim_start().starts_with('<')) {
                html_to_text(&body)
            } else {
                body
            };
            if text.len() > FETCH_MAX_BYTES {
                text = truncate_utf8(&text, FETCH_MAX_BYTES);
                text.push_str("\n... (truncated)");
            }

            Ok(text)
        },
        true,
    );
}

/// Flatten HTML to readable plain text, falling back to the raw input when
/// the document cannot be parsed.
fn html_to_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), 100) {
        Ok(text) => text,
        Err(_) => html.to_string(),
    }
}

fn register_memory_tools(registry: &mut ToolRegistry, memory: Arc<MemoryStore>) {
    let store = Arc::clone(&memory);
    registry.register_fn(
        "save_memory",
        "Save a key/value pair to persistent memory",
        serde_json::json!({
            "type": "object",
            "properties": {
                "key": {"type": "string", "description": "Memory key"},
                "value": {"type": "string", "description": "Value to remember"}
            },
            "required": ["key", "value"]
        }),
        move |_ctx: ToolContext, arguments: String| {
            let store = Arc::clone(&store);
            async move {
                let args = parse_args("save_memory", &arguments)?;
                let key = required_str("save_memory", &args, "key")?;
                let value = required_str("save_memory", &args, "value")?;
                store.set(key, value)?;
                Ok("Saved".to_string())
            }
        },
        true,
    );

    let store = Arc::clone(&memory);
    registry.register_fn(
        "get_memory",
        "Look up a value in persistent memory",
        serde_json::json!({
            "type": "object",
            "properties": {
                "key": {"type": "string", "description": "Memory key"}
            },
            "required": ["key"]
        }),
        move |_ctx: ToolContext, arguments: String| {
            let store = Arc::clone(&store);
            async move {
                let args = parse_args("get_memory", &arguments)?;
                let key = required_str("get_memory", &args, "key")?;
                Ok(store.get(key))
            }
        },
        true,
    );

    let store = Arc::clone(&memory);
    registry.register_fn(
        "delete_memory",
        "Delete a key from persistent memory",
        serde_json::json!({
            "type": "object",
            "properties": {
                "key": {"type": "string", "description": "Memory key"}
            },
            "required": ["key"]
        }),
        move |_ctx: ToolContext, arguments: String| {
            let store = Arc::clone(&store);
            async move {
                let args = parse_args("delete_memory", &arguments)?;
                let key = required_str("delete_memory", &args, "key")?;
                store.delete(key)?;
                Ok("Deleted".to_string())
            }
        },
        true,
    );

    let store = Arc::clone(&memory);
    registry.register_fn(
        "list_memory",
        "List every key/value pair in persistent memory as JSON",
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        }),
        move |_ctx: ToolContext, _arguments: String| {
            let store = Arc::clone(&store);
            async move {
                let all = store.all();
                Ok(serde_json::to_string(&all)?)
            }
        },
        true,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn test_registry() -> (ToolRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryStore::load(dir.path()).unwrap());
        let mut registry = ToolRegistry::new();
        register_all(&mut registry, memory);
        (registry, dir)
    }

    async fn run(registry: &ToolRegistry, name: &str, args: serde_json::Value) -> Result<String> {
        let reg = registry.get(name).expect("tool registered");
        let ctx = ToolContext {
            cancel: CancellationToken::new(),
        };
        (reg.handler)(ctx, args.to_string()).await
    }

    #[test]
    fn all_builtin_tools_are_registered() {
        let (registry, _dir) = test_registry();
        for name in [
            "run_command",
            "read_file",
            "write_file",
            "list_files",
            "search_files",
            "fetch_url",
            "save_memory",
            "get_memory",
            "delete_memory",
            "list_memory",
        ] {
            assert!(registry.contains(name), "missing tool: {name}");
        }
    }

    #[test]
    fn mutating_tools_are_unsafe_readers_are_safe() {
        let (registry, _dir) = test_registry();
        assert!(!registry.get("run_command").unwrap().safe);
        assert!(!registry.get("write_file").unwrap().safe);
        assert!(registry.get("read_file").unwrap().safe);
        assert!(registry.get("list_files").unwrap().safe);
        assert!(registry.get("save_memory").unwrap().safe);
    }

    #[tokio::test]
    async fn run_command_captures_output_and_exit_code() {
        let (registry, _dir) = test_registry();
        let out = run(
            &registry,
            "run_command",
            serde_json::json!({"command": "echo hello; exit 3"}),
        )
        .await
        .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["exit_code"], 3);
        assert!(parsed["output"].as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn run_command_rejects_missing_argument() {
        let (registry, _dir) = test_registry();
        let err = run(&registry, "run_command", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TernError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn read_file_round_trips_write_file() {
        let (registry, _dir) = test_registry();
        let scratch = tempfile::tempdir().unwrap();
        let path = scratch.path().join("nested").join("out.txt");
        let path_str = path.to_str().unwrap();

        let msg = run(
            &registry,
            "write_file",
            serde_json::json!({"path": path_str, "content": "hello tern"}),
        )
        .await
        .unwrap();
        assert!(msg.contains("10 bytes"));

        let content = run(
            &registry,
            "read_file",
            serde_json::json!({"path": path_str}),
        )
        .await
        .unwrap();
        assert_eq!(content, "hello tern");
    }

    #[tokio::test]
    async fn read_file_errors_on_missing_file() {
        let (registry, _dir) = test_registry();
        let err = run(
            &registry,
            "read_file",
            serde_json::json!({"path": "/tmp/tern_nonexistent_abc123"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TernError::ToolExecution { .. }));
    }

    #[tokio::test]
    async fn list_files_returns_sorted_entries() {
        let (registry, _dir) = test_registry();
        let scratch = tempfile::tempdir().unwrap();
        std::fs::write(scratch.path().join("zebra.txt"), "").unwrap();
        std::fs::write(scratch.path().join("alpha.txt"), "").unwrap();

        let out = run(
            &registry,
            "list_files",
            serde_json::json!({"path": scratch.path().to_str().unwrap()}),
        )
        .await
        .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        let names: Vec<&str> = parsed["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["alpha.txt", "zebra.txt"]);
    }

    #[tokio::test]
    async fn search_files_finds_matches() {
        let (registry, _dir) = test_registry();
        let scratch = tempfile::tempdir().unwrap();
        std::fs::write(scratch.path().join("needle.txt"), "findme\n").unwrap();

        let out = run(
            &registry,
            "search_files",
            serde_json::json!({"pattern": "findme", "path": scratch.path().to_str().unwrap()}),
        )
        .await
        .unwrap();
        assert!(out.contains("findme"));
    }

    #[tokio::test]
    async fn memory_tools_round_trip() {
        let (registry, _dir) = test_registry();

        let saved = run(
            &registry,
            "save_memory",
            serde_json::json!({"key": "color", "value": "teal"}),
        )
        .await
        .unwrap();
        assert_eq!(saved, "Saved");

        let got = run(&registry, "get_memory", serde_json::json!({"key": "color"}))
            .await
            .unwrap();
        assert_eq!(got, "teal");

        let listed = run(&registry, "list_memory", serde_json::json!({}))
            .await
            .unwrap();
        assert!(listed.contains("\"color\":\"teal\""));

        let deleted = run(
            &registry,
            "delete_memory",
            serde_json::json!({"key": "color"}),
        )
        .await
        .unwrap();
        assert_eq!(deleted, "Deleted");
    }

    #[test]
    fn html_is_flattened_to_text() {
        let text = html_to_text("<html><body><h1>Title</h1><p>Hello world</p></body></html>");
        assert!(text.contains("Title"));
        assert!(text.contains("Hello world"));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn truncate_utf8_never_splits_codepoints() {
        let s = "ab😀cd";
        assert_eq!(truncate_utf8(s, 2), "ab");
        // 3..=5 would cut into the 4-byte codepoint, so back off to "ab".
        assert_eq!(truncate_utf8(s, 3), "ab");
        assert_eq!(truncate_utf8(s, 5), "ab");
        assert_eq!(truncate_utf8(s, 6), "ab😀");
    }
}
