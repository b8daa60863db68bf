//! End-to-end tests for the conversation engine loop.

mod common;

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use common::MockTransport;
use tern::config::EngineConfig;
use tern::engine::{ChatOptions, Engine};
use tern::error::TernError;
use tern::tools::ToolRegistry;
use tern::types::{ChatMessage, Role};

fn echo_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register_fn(
        "echo",
        "Echo the input back",
        serde_json::json!({
            "type": "object",
            "properties": {"input": {"type": "string"}},
            "required": ["input"]
        }),
        |_ctx, args: String| async move { Ok(format!("result:{args}")) },
        true,
    );
    registry
}

fn engine_with(transport: Arc<MockTransport>, config: EngineConfig) -> Engine {
    Engine::new(transport, "test-model", config).with_registry(echo_registry())
}

#[tokio::test]
async fn tool_call_turn_then_final_text() {
    let transport = Arc::new(
        MockTransport::new()
            .reply_tool_call("call_1", "echo", &["hel", "lo"])
            .reply_text("done"),
    );
    let engine = engine_with(Arc::clone(&transport), EngineConfig::default());

    let outcome = engine
        .chat(
            CancellationToken::new(),
            vec![ChatMessage::user("please echo hello")],
            &ChatOptions::default(),
        )
        .await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.text, "done");

    let messages = &outcome.messages;
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0], ChatMessage::user("please echo hello"));

    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].tool_calls.len(), 1);
    assert_eq!(messages[1].tool_calls[0].id, "call_1");
    assert_eq!(messages[1].tool_calls[0].name, "echo");
    assert_eq!(messages[1].tool_calls[0].arguments, "hello");

    assert_eq!(messages[2].role, Role::Tool);
    assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(messages[2].content, "result:hello");

    assert_eq!(messages[3], ChatMessage::assistant("done"));
}

#[tokio::test]
async fn unknown_tool_continues_the_loop() {
    let transport = Arc::new(
        MockTransport::new()
            .reply_tool_call("call_1", "bogus", &["{}"])
            .reply_text("recovered"),
    );
    let engine = engine_with(Arc::clone(&transport), EngineConfig::default());

    let outcome = engine
        .chat(
            CancellationToken::new(),
            vec![ChatMessage::user("go")],
            &ChatOptions::default(),
        )
        .await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.text, "recovered");
    assert_eq!(outcome.messages[2].content, "Unknown tool: bogus");
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn autonomous_cap_soft_stops_the_loop() {
    let transport = Arc::new(MockTransport::new().always_tool_call("call_x", "echo", "loop"));
    let engine = engine_with(
        Arc::clone(&transport),
        EngineConfig {
            max_autonomous_iterations: 3,
            ..Default::default()
        },
    );

    let outcome = engine
        .chat(
            CancellationToken::new(),
            vec![ChatMessage::user("never stop")],
            &ChatOptions::new().with_autonomous(true),
        )
        .await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.text, "");
    assert_eq!(transport.request_count(), 3);
    // user + 3 × (assistant tool-call + tool result)
    assert_eq!(outcome.messages.len(), 7);
}

#[tokio::test]
async fn without_autonomous_mode_the_cap_does_not_apply() {
    let transport = Arc::new(
        MockTransport::new()
            .reply_tool_call("c1", "echo", &["a"])
            .reply_tool_call("c2", "echo", &["b"])
            .reply_tool_call("c3", "echo", &["c"])
            .reply_text("finally"),
    );
    let engine = engine_with(
        Arc::clone(&transport),
        EngineConfig {
            max_autonomous_iterations: 2,
            ..Default::default()
        },
    );

    let outcome = engine
        .chat(
            CancellationToken::new(),
            vec![ChatMessage::user("go")],
            &ChatOptions::default(),
        )
        .await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.text, "finally");
    assert_eq!(transport.request_count(), 4);
}

#[tokio::test]
async fn hard_error_returns_accumulated_log() {
    // First turn requests a tool; the second turn's transport fails.
    let transport = Arc::new(MockTransport::new().reply_tool_call("call_1", "echo", &["hi"]));
    let engine = engine_with(
        Arc::clone(&transport),
        EngineConfig {
            max_retries: 1,
            ..Default::default()
        },
    );
    tokio::time::pause();

    let outcome = engine
        .chat(
            CancellationToken::new(),
            vec![ChatMessage::user("go")],
            &ChatOptions::default(),
        )
        .await;

    let err = outcome.error.expect("loop must fail");
    assert!(matches!(err, TernError::RetriesExhausted { retries: 1, .. }));
    // The completed tool turn is preserved in the returned log.
    assert_eq!(outcome.messages.len(), 3);
    assert_eq!(outcome.messages[1].role, Role::Assistant);
    assert_eq!(outcome.messages[2].content, "result:hi");
}

#[tokio::test]
async fn content_deltas_stream_to_observer() {
    let transport = Arc::new(MockTransport::new().queue(vec![
        tern::types::StreamDelta::content("par"),
        tern::types::StreamDelta::content("tial"),
        tern::types::StreamDelta::finish(tern::types::FinishReason::Stop),
    ]));
    let engine = engine_with(Arc::clone(&transport), EngineConfig::default());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = Arc::clone(&seen);
    let opts = ChatOptions::new().with_on_content(move |text| {
        seen_cb.lock().unwrap().push(text.to_string());
    });

    let outcome = engine
        .chat(CancellationToken::new(), vec![ChatMessage::user("hi")], &opts)
        .await;

    assert_eq!(outcome.text, "partial");
    assert_eq!(*seen.lock().unwrap(), vec!["par", "tial"]);
}

#[tokio::test]
async fn compression_splices_before_the_turn() {
    let transport = Arc::new(
        MockTransport::new()
            .reply_text("a short summary")
            .reply_text("final answer"),
    );
    let engine = engine_with(
        Arc::clone(&transport),
        EngineConfig {
            compress_threshold: 50,
            max_context_chars: 60,
            ..Default::default()
        },
    );

    let compressed = Arc::new(Mutex::new(None));
    let compressed_cb = Arc::clone(&compressed);
    let opts = ChatOptions::new().with_on_compressed(move |chars| {
        *compressed_cb.lock().unwrap() = Some(chars);
    });

    let seed = vec![
        ChatMessage::user("x".repeat(60)),
        ChatMessage::assistant("y".repeat(60)),
        ChatMessage::user("question"),
    ];
    let outcome = engine.chat(CancellationToken::new(), seed, &opts).await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.text, "final answer");
    assert_eq!(*compressed.lock().unwrap(), Some(128));

    let messages = &outcome.messages;
    assert!(messages[0]
        .content
        .starts_with("[Previous conversation summary]\n"));
    assert!(messages[0].content.contains("a short summary"));
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[2].content, "question");
    assert_eq!(messages[3].content, "final answer");

    // The summarization request carries no tool declarations; the primary
    // turn carries the registry.
    let requests = transport.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].tools.is_empty());
    assert_eq!(requests[1].tools.len(), 1);
    assert_eq!(requests[1].tools[0].name, "echo");
}

#[tokio::test]
async fn execute_tool_bypasses_the_loop() {
    let transport = Arc::new(MockTransport::new());
    let engine = engine_with(Arc::clone(&transport), EngineConfig::default());

    let result = engine
        .execute_tool(CancellationToken::new(), "echo", "direct")
        .await;
    assert_eq!(result, "result:direct");

    let result = engine
        .execute_tool(CancellationToken::new(), "nope", "{}")
        .await;
    assert_eq!(result, "Unknown tool: nope");
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn registry_can_be_swapped_mid_session() {
    let transport = Arc::new(MockTransport::new());
    let engine = engine_with(Arc::clone(&transport), EngineConfig::default());
    assert!(engine.has_tool("echo"));

    let mut replacement = ToolRegistry::new();
    replacement.register_fn(
        "shout",
        "",
        serde_json::json!({}),
        |_ctx, args: String| async move { Ok(args.to_uppercase()) },
        true,
    );
    engine.set_registry(replacement);

    assert!(!engine.has_tool("echo"));
    assert!(engine.has_tool("shout"));
    let result = engine
        .execute_tool(CancellationToken::new(), "shout", "hey")
        .await;
    assert_eq!(result, "HEY");
}

#[tokio::test]
async fn model_can_be_swapped_mid_session() {
    let transport = Arc::new(MockTransport::new().reply_text("ok"));
    let engine = engine_with(Arc::clone(&transport), EngineConfig::default());
    engine.set_model("other-model");

    engine
        .chat(
            CancellationToken::new(),
            vec![ChatMessage::user("hi")],
            &ChatOptions::default(),
        )
        .await;

    assert_eq!(transport.requests.lock().unwrap()[0].model, "other-model");
}
