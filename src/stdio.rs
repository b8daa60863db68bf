//! Line-delimited batch protocol over stdin/stdout.
//!
//! Each input line is a JSON object: either a raw chat request
//! `{"messages": [...], "stream": bool}` or a JSON-RPC 2.0 envelope with
//! method `"chat"`. Responses are line-delimited JSON. Invalid input
//! produces an error line and processing continues.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::engine::{ChatOptions, Engine};
use crate::error::Result;
use crate::types::ChatMessage;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    id: Option<serde_json::Value>,
    method: String,
    #[serde(default)]
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatRequestLine {
    messages: Vec<ChatMessage>,
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Default, Serialize)]
struct ChatResponseLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub type EmitFn = Arc<dyn Fn(String) + Send + Sync>;

/// Read JSON lines from stdin until EOF, emitting response lines to
/// stdout. Tool calls run unattended; no approver applies in this mode.
pub async fn run_stdio_mode(engine: Arc<Engine>) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let emit: EmitFn = Arc::new(|line| println!("{line}"));

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        process_line(&engine, &line, &emit).await;
    }
    Ok(())
}

/// Handle one input line, emitting zero or more response lines.
pub async fn process_line(engine: &Arc<Engine>, line: &str, emit: &EmitFn) {
    let raw: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            emit_response(
                emit,
                ChatResponseLine {
                    error: Some(format!("Invalid JSON: {e}")),
                    ..Default::default()
                },
            );
            return;
        }
    };

    if raw.get("jsonrpc").is_some() {
        handle_jsonrpc(engine, raw, emit).await;
    } else {
        handle_line_delimited(engine, raw, emit).await;
    }
}

async fn handle_jsonrpc(engine: &Arc<Engine>, raw: serde_json::Value, emit: &EmitFn) {
    let req: JsonRpcRequest = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(e) => {
            emit_jsonrpc_error(emit, None, "Parse error", &e.to_string());
            return;
        }
    };

    if req.method != "chat" {
        emit_jsonrpc_error(
            emit,
            req.id,
            "Method not found",
            &format!("Unknown method: {}", req.method),
        );
        return;
    }

    let chat_req: ChatRequestLine = match serde_json::from_value(req.params) {
        Ok(r) => r,
        Err(e) => {
            emit_jsonrpc_error(emit, req.id, "Invalid params", &e.to_string());
            return;
        }
    };

    if chat_req.stream {
        let id = req.id.clone();
        let emit_chunk = Arc::clone(emit);
        let opts = ChatOptions::new().with_on_content(move |text| {
            emit_jsonrpc_result(
                &emit_chunk,
                id.clone(),
                &ChatResponseLine {
                    content: Some(text.to_string()),
                    ..Default::default()
                },
            );
        });
        let outcome = engine
            .chat(CancellationToken::new(), chat_req.messages, &opts)
            .await;
        match outcome.error {
            Some(e) => emit_jsonrpc_error(emit, req.id, "Chat error", &e.to_string()),
            None => emit_jsonrpc_result(
                emit,
                req.id,
                &ChatResponseLine {
                    done: true,
                    ..Default::default()
                },
            ),
        }
    } else {
        let outcome = engine
            .chat(
                CancellationToken::new(),
                chat_req.messages,
                &ChatOptions::default(),
            )
            .await;
        match outcome.error {
            Some(e) => emit_jsonrpc_error(emit, req.id, "Chat error", &e.to_string()),
            None => emit_jsonrpc_result(
                emit,
                req.id,
                &ChatResponseLine {
                    content: Some(outcome.text),
                    done: true,
                    ..Default::default()
                },
            ),
        }
    }
}

async fn handle_line_delimited(engine: &Arc<Engine>, raw: serde_json::Value, emit: &EmitFn) {
    let chat_req: ChatRequestLine = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(e) => {
            emit_response(
                emit,
                ChatResponseLine {
                    error: Some(format!("Invalid request: {e}")),
                    ..Default::default()
                },
            );
            return;
        }
    };

    if chat_req.stream {
        let emit_chunk = Arc::clone(emit);
        let opts = ChatOptions::new().with_on_content(move |text| {
            emit_response(
                &emit_chunk,
                ChatResponseLine {
                    content: Some(text.to_string()),
                    ..Default::default()
                },
            );
        });
        let outcome = engine
            .chat(CancellationToken::new(), chat_req.messages, &opts)
            .await;
        emit_response(
            emit,
            match outcome.error {
                Some(e) => ChatResponseLine {
                    error: Some(e.to_string()),
                    ..Default::default()
                },
                None => ChatResponseLine {
                    done: true,
                    ..Default::default()
                },
            },
        );
    } else {
        let outcome = engine
            .chat(
                CancellationToken::new(),
                chat_req.messages,
                &ChatOptions::default(),
            )
            .await;
        emit_response(
            emit,
            match outcome.error {
                Some(e) => ChatResponseLine {
                    error: Some(e.to_string()),
                    ..Default::default()
                },
                None => ChatResponseLine {
                    content: Some(outcome.text),
                    done: true,
                    ..Default::default()
                },
            },
        );
    }
}

fn emit_response(emit: &EmitFn, response: ChatResponseLine) {
    if let Ok(json) = serde_json::to_string(&response) {
        emit(json);
    }
}

fn emit_jsonrpc_result(emit: &EmitFn, id: Option<serde_json::Value>, result: &ChatResponseLine) {
    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    });
    emit(payload.to_string());
}

fn emit_jsonrpc_error(emit: &EmitFn, id: Option<serde_json::Value>, message: &str, data: &str) {
    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "message": message, "data": data },
    });
    emit(payload.to_string());
}
