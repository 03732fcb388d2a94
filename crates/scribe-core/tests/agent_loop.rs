//! End-to-end tests for `Agent::run()` with a scripted provider.
//!
//! Covers the plain reply path, a tool round trip, the loop cap, every
//! cancellation point (queued, model call, tool call) and model failures. Every
//! test checks what ended up in the session store, not only what the callback
//! saw.

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scribe_core::{Agent, AgentEvent, ChatService, MAX_TOOL_LOOPS, build_messages};
use scribe_store::{KnowledgeStore, SessionStore};
use scribe_tools::ToolRegistry;
use scribe_types::{
    ApiError, Author, Content, ContentBlock, CreateMessageRequest, CreateMessageResponse, Role,
    ScribeError, StopReason, Tool, ToolContext, ToolDefinition, ToolFuture, ToolOutput, Usage,
    provider::Provider,
};
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// ScriptedProvider
// ---------------------------------------------------------------------------

enum Step {
    Reply(Vec<ContentBlock>),
    Fail(ApiError),
}

/// Plays back scripted replies in order, optionally after a delay. When the
/// script runs out, `fallback` is repeated.
struct ScriptedProvider {
    script: Mutex<VecDeque<Step>>,
    fallback: Option<Vec<ContentBlock>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<CreateMessageRequest>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Provider for ScriptedProvider {
    fn create_message<'a>(
        &'a self,
        request: &'a CreateMessageRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CreateMessageResponse, ApiError>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.requests.lock().unwrap().push(request.clone());
            let step = self.script.lock().unwrap().pop_front();
            let content = match step {
                Some(Step::Reply(content)) => content,
                Some(Step::Fail(err)) => return Err(err),
                None => self.fallback.clone().unwrap_or_default(),
            };
            let has_tool = content
                .iter()
                .any(|b| matches!(b, ContentBlock::ToolUse { .. }));
            Ok(CreateMessageResponse {
                id: "msg".into(),
                role: Role::Assistant,
                content,
                model: request.model.clone(),
                stop_reason: Some(if has_tool {
                    StopReason::ToolUse
                } else {
                    StopReason::EndTurn
                }),
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 5,
                },
            })
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn text(t: &str) -> ContentBlock {
    ContentBlock::Text { text: t.into() }
}

fn tool_use(id: &str, name: &str) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.into(),
        name: name.into(),
        input: json!({"value": id}),
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Echoes its `value` input.
struct EchoTool;

impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".into(),
            description: "Echo the value back".into(),
            input_schema: json!({"type": "object", "properties": {"value": {"type": "string"}}}),
        }
    }

    fn execute(&self, input: serde_json::Value, _ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async move {
            Ok(ToolOutput::text(format!(
                "echo: {}",
                input["value"].as_str().unwrap_or_default()
            )))
        })
    }
}

/// Sleeps long enough to be cancelled.
struct SlowTool;

impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "slow".into(),
            description: "Takes a while".into(),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(ToolOutput::text("too late"))
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

const APP: &str = "document_app";
const USER: &str = "u1";

fn agent(provider: Arc<ScriptedProvider>, root: &Path) -> Agent {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool));
    registry.register(Arc::new(SlowTool));
    let mut agent = Agent::new(provider, registry, "test-model".into(), 512, root.to_path_buf());
    agent.set_system_prompt("be helpful");
    agent
}

async fn store(tmp: &TempDir) -> SessionStore {
    SessionStore::open(tmp.path().join("chat_history_db.json"))
        .await
        .unwrap()
}

fn label(event: &AgentEvent) -> String {
    match event {
        AgentEvent::Appended(e) => format!("appended:{}", e.author),
        AgentEvent::ToolStart { name } => format!("start:{name}"),
        AgentEvent::ToolEnd { name, .. } => format!("end:{name}"),
        AgentEvent::Done(_) => "done".into(),
        AgentEvent::LoopLimit => "limit".into(),
        AgentEvent::Cancelled => "cancelled".into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn plain_reply_is_persisted() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp).await;
    let provider = Arc::new(ScriptedProvider::new(vec![Step::Reply(vec![text("Hello!")])]));
    let agent = agent(provider.clone(), tmp.path());

    let mut session = store.create(APP, USER, Some("s1"), None).await.unwrap();
    let mut seen = Vec::new();
    let usage = agent
        .run(
            &mut session,
            &store,
            Content::from("hi"),
            CancellationToken::new(),
            |e| seen.push(label(&e)),
        )
        .await
        .unwrap();

    assert_eq!(usage.output_tokens, 5);
    assert_eq!(seen, vec!["appended:user", "appended:document_agent", "done"]);

    let loaded = store.get(APP, USER, "s1").await.unwrap().unwrap();
    assert_eq!(loaded.events.len(), 2);
    assert_eq!(loaded.events[1].text(), "Hello!");

    let request = &provider.requests.lock().unwrap()[0];
    assert_eq!(request.system.as_deref(), Some("be helpful"));
    assert_eq!(request.tools.as_ref().unwrap().len(), 2);
}

#[tokio::test]
async fn tool_round_trip() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp).await;
    let provider = Arc::new(ScriptedProvider::new(vec![
        Step::Reply(vec![text("Let me check."), tool_use("t1", "echo")]),
        Step::Reply(vec![text("All done.")]),
    ]));
    let agent = agent(provider.clone(), tmp.path());

    let mut session = store.create(APP, USER, Some("s1"), None).await.unwrap();
    let mut seen = Vec::new();
    agent
        .run(
            &mut session,
            &store,
            Content::from("go"),
            CancellationToken::new(),
            |e| seen.push(label(&e)),
        )
        .await
        .unwrap();

    assert_eq!(
        seen,
        vec![
            "appended:user",
            "appended:document_agent",
            "start:echo",
            "end:echo",
            "appended:tool",
            "appended:document_agent",
            "done",
        ]
    );

    let loaded = store.get(APP, USER, "s1").await.unwrap().unwrap();
    assert_eq!(loaded.events.len(), 4);
    assert_eq!(loaded.events[2].author, Author::Tool);
    assert_eq!(loaded.events[2].text(), "echo: t1");

    // The second request replays the call and its result.
    let requests = provider.requests.lock().unwrap();
    let replay = &requests[1].messages;
    assert_eq!(replay.len(), 3);
    assert!(matches!(&replay[2].content[0], ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "t1"));
}

#[tokio::test]
async fn unknown_tool_becomes_error_result() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp).await;
    let provider = Arc::new(ScriptedProvider::new(vec![
        Step::Reply(vec![tool_use("t1", "nope")]),
        Step::Reply(vec![text("Sorry.")]),
    ]));
    let agent = agent(provider, tmp.path());

    let mut session = store.create(APP, USER, Some("s1"), None).await.unwrap();
    agent
        .run(&mut session, &store, Content::from("go"), CancellationToken::new(), |_| {})
        .await
        .unwrap();

    let result = serde_json::to_value(&session.events[2].content).unwrap();
    assert_eq!(result["parts"][0]["is_error"], true);
    assert_eq!(result["parts"][0]["output"], "Unknown tool: nope");
}

#[tokio::test]
async fn loop_cap_stops_the_turn() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp).await;
    let provider = Arc::new(ScriptedProvider {
        fallback: Some(vec![tool_use("again", "echo")]),
        ..ScriptedProvider::new(Vec::new())
    });
    let agent = agent(provider.clone(), tmp.path());

    let mut session = store.create(APP, USER, Some("s1"), None).await.unwrap();
    let mut seen = Vec::new();
    agent
        .run(
            &mut session,
            &store,
            Content::from("loop"),
            CancellationToken::new(),
            |e| seen.push(label(&e)),
        )
        .await
        .unwrap();

    assert_eq!(provider.calls(), MAX_TOOL_LOOPS);
    assert_eq!(seen.last().map(String::as_str), Some("limit"));
    assert_eq!(session.events.len(), 1 + 2 * MAX_TOOL_LOOPS);
}

#[tokio::test]
async fn cancel_during_model_call() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp).await;
    let provider = Arc::new(ScriptedProvider {
        delay: Some(Duration::from_secs(10)),
        ..ScriptedProvider::new(vec![Step::Reply(vec![text("late")])])
    });
    let agent = agent(provider, tmp.path());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let mut session = store.create(APP, USER, Some("s1"), None).await.unwrap();
    let mut seen = Vec::new();
    let result = agent
        .run(&mut session, &store, Content::from("hi"), cancel, |e| {
            seen.push(label(&e))
        })
        .await;

    assert!(matches!(result, Err(ScribeError::Cancelled)));
    assert_eq!(seen, vec!["appended:user", "cancelled"]);
    let loaded = store.get(APP, USER, "s1").await.unwrap().unwrap();
    assert_eq!(loaded.events.len(), 1);
}

#[tokio::test]
async fn cancel_during_tool_leaves_replayable_history() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp).await;
    let provider = Arc::new(ScriptedProvider::new(vec![Step::Reply(vec![tool_use(
        "t1", "slow",
    )])]));
    let agent = agent(provider, tmp.path());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let mut session = store.create(APP, USER, Some("s1"), None).await.unwrap();
    let result = agent
        .run(&mut session, &store, Content::from("hi"), cancel, |_| {})
        .await;
    assert!(matches!(result, Err(ScribeError::Cancelled)));

    let loaded = store.get(APP, USER, "s1").await.unwrap().unwrap();
    assert_eq!(loaded.events.len(), 2);
    assert_eq!(loaded.events[1].tool_calls().len(), 1);

    // The dangling call is not replayed to the model.
    let messages = build_messages(&loaded.events, tmp.path()).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
}

#[tokio::test]
async fn model_error_propagates_after_user_event() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp).await;
    let provider = Arc::new(ScriptedProvider::new(vec![Step::Fail(ApiError::Auth {
        message: "bad key".into(),
    })]));
    let agent = agent(provider, tmp.path());

    let mut session = store.create(APP, USER, Some("s1"), None).await.unwrap();
    let result = agent
        .run(&mut session, &store, Content::from("hi"), CancellationToken::new(), |_| {})
        .await;
    assert!(matches!(result, Err(ScribeError::Api(ApiError::Auth { .. }))));

    let loaded = store.get(APP, USER, "s1").await.unwrap().unwrap();
    assert_eq!(loaded.events.len(), 1);
    assert_eq!(loaded.events[0].author, Author::User);
}

#[tokio::test]
async fn chat_service_creates_session_and_clears() {
    let tmp = TempDir::new().unwrap();
    let sessions = Arc::new(store(&tmp).await);
    let knowledge = Arc::new(
        KnowledgeStore::open(tmp.path().join("knowledge_db.json"))
            .await
            .unwrap(),
    );
    let resumes = tmp.path().join("resumes");
    std::fs::create_dir_all(resumes.join("processed")).unwrap();
    std::fs::write(resumes.join("new.pdf"), b"x").unwrap();
    std::fs::write(resumes.join("processed").join("old.pdf"), b"x").unwrap();
    knowledge
        .save_summary("old.pdf", "summary", "Resume (PDF)")
        .await
        .unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![Step::Reply(vec![text("Hi!")])]));
    let service = ChatService::new(
        agent(provider, tmp.path()),
        sessions.clone(),
        knowledge.clone(),
        APP,
        &resumes,
    );

    let message = service.compose("hello", &[]).await;
    service
        .send(USER, "fresh", message, CancellationToken::new(), |_| {})
        .await
        .unwrap();
    let listed = service.sessions(USER).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, "fresh");
    assert!(listed[0].events.is_empty(), "listing omits events");

    let cleared = service.clear_knowledge().await.unwrap();
    assert_eq!(cleared.entries, 1);
    assert_eq!(cleared.files_removed, 2);
    assert!(!knowledge.has_summary("old.pdf").await);

    assert_eq!(service.clear_history().await.unwrap(), 1);
    assert!(service.session(USER, "fresh").await.unwrap().is_none());
}

#[tokio::test]
async fn cancelled_before_start_appends_nothing() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp).await;
    let provider = Arc::new(ScriptedProvider::new(vec![Step::Reply(vec![text("unused")])]));
    let agent = agent(provider.clone(), tmp.path());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut session = store.create(APP, USER, Some("s1"), None).await.unwrap();
    let mut seen = Vec::new();
    let result = agent
        .run(&mut session, &store, Content::from("hi"), cancel, |e| {
            seen.push(label(&e))
        })
        .await;

    assert!(matches!(result, Err(ScribeError::Cancelled)));
    assert_eq!(seen, vec!["cancelled"]);
    assert_eq!(provider.calls(), 0);
    let loaded = store.get(APP, USER, "s1").await.unwrap().unwrap();
    assert!(loaded.events.is_empty());
}

#[tokio::test]
async fn turn_cancelled_while_queued_leaves_no_trace() {
    let tmp = TempDir::new().unwrap();
    let sessions = Arc::new(store(&tmp).await);
    let knowledge = Arc::new(
        KnowledgeStore::open(tmp.path().join("knowledge_db.json"))
            .await
            .unwrap(),
    );
    let provider = Arc::new(ScriptedProvider {
        delay: Some(Duration::from_millis(200)),
        ..ScriptedProvider::new(vec![Step::Reply(vec![text("first")])])
    });
    let service = ChatService::new(
        agent(provider.clone(), tmp.path()),
        sessions,
        knowledge,
        APP,
        tmp.path().join("resumes"),
    );

    let queued = CancellationToken::new();
    let trigger = queued.clone();
    let (first, second, ()) = tokio::join!(
        service.send(USER, "busy", Content::from("one"), CancellationToken::new(), |_| {}),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            service
                .send(USER, "queued", Content::from("two"), queued, |_| {})
                .await
        },
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        },
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(ScribeError::Cancelled)));
    assert_eq!(provider.calls(), 1);
    assert!(service.session(USER, "queued").await.unwrap().is_none());
}
