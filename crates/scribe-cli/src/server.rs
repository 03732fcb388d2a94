//! HTTP front end: chat over server-sent events, file uploads and
//! maintenance endpoints.

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{
        Sse,
        sse::{Event as SseEvent, KeepAlive},
    },
    routing::{get, post},
};
use futures_util::{Stream, StreamExt, stream};
use scribe_config::{DEFAULT_SESSION_ID, DEFAULT_USER_ID, ScribeConfig};
use scribe_core::{AgentEvent, ChatService, event_text};
use scribe_store::Session;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use uuid::Uuid;

const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "pdf", "txt", "docx"];

/// Request body cap for the upload routes; scanned PDFs and photos exceed
/// axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

type ApiFailure = (StatusCode, Json<Value>);

#[derive(Clone)]
pub struct AppState {
    service: Arc<ChatService>,
    /// Chat file paths and upload paths are relative to this.
    root: PathBuf,
    upload_dir: PathBuf,
    resumes_dir: PathBuf,
}

impl AppState {
    pub fn new(service: Arc<ChatService>, config: &ScribeConfig) -> Self {
        Self {
            service,
            root: config.project_root.clone(),
            upload_dir: config.upload_dir(),
            resumes_dir: config.resumes_dir(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub message: String,
    pub file_paths: Vec<String>,
}

/// One `data:` payload of the chat stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatChunk {
    AgentMessage { text: String },
    Error { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResponse {
    pub path: String,
    pub filename: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionsQuery {
    pub user_id: Option<String>,
}

pub fn router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route(
            "/api/upload",
            post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/api/upload_resume",
            post(upload_resume).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/clear_chat", post(clear_chat))
        .route("/api/clear_knowledge", post(clear_knowledge))
        .route("/api/sessions", get(list_sessions))
        .with_state(state);

    match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}

/// Bind and serve until Ctrl+C.
pub async fn serve(state: AppState, host: &str, port: u16, static_dir: PathBuf) -> Result<()> {
    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .context("Failed to create upload directory")?;

    let static_dir = Some(static_dir).filter(|d| d.is_dir());
    if let Some(dir) = &static_dir {
        tracing::info!("Serving static files from {}", dir.display());
    }
    let app = router(state, static_dir);

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on http://{addr}");
    eprintln!("scribe server listening on http://{addr}/ (Ctrl+C to stop)");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("Server error")
}

async fn health() -> &'static str {
    "OK"
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = spawn_turn(state, request);

    let chunks = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    })
    .map(|chunk| {
        let event = SseEvent::default().json_data(&chunk).unwrap_or_else(|e| {
            tracing::warn!("Failed to encode chat chunk: {e}");
            SseEvent::default().data(r#"{"type":"error","text":"serialization error"}"#)
        });
        Ok::<_, Infallible>(event)
    });
    let done = stream::once(async {
        Ok::<_, Infallible>(SseEvent::default().event("done").data(""))
    });

    Sse::new(chunks.chain(done)).keep_alive(KeepAlive::default())
}

/// Run a turn in the background and feed its agent replies into a channel.
/// The channel closes when the turn ends; dropping the receiver cancels it.
fn spawn_turn(state: AppState, request: ChatRequest) -> mpsc::UnboundedReceiver<ChatChunk> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let user_id = request
            .user_id
            .unwrap_or_else(|| DEFAULT_USER_ID.to_string());
        let session_id = request
            .session_id
            .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());

        let message = state
            .service
            .compose(&request.message, &request.file_paths)
            .await;
        if message.is_empty() {
            let _ = tx.send(ChatChunk::Error {
                text: "Message is empty".into(),
            });
            return;
        }

        let cancel = CancellationToken::new();
        let watcher = {
            let (tx, cancel) = (tx.clone(), cancel.clone());
            tokio::spawn(async move {
                tx.closed().await;
                cancel.cancel();
            })
        };

        let sink = tx.clone();
        let result = state
            .service
            .send(&user_id, &session_id, message, cancel, move |event| {
                if let AgentEvent::Appended(event) = event {
                    if event.author.is_agent() {
                        let text = event_text(&event);
                        if !text.is_empty() {
                            let _ = sink.send(ChatChunk::AgentMessage { text });
                        }
                    }
                }
            })
            .await;
        watcher.abort();

        if let Err(e) = result {
            tracing::warn!("Chat turn in session {session_id} failed: {e}");
            let _ = tx.send(ChatChunk::Error {
                text: e.to_string(),
            });
        }
    });

    rx
}

async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiFailure> {
    receive_upload(multipart, &state.root, &state.upload_dir)
        .await
        .map(Json)
}

async fn upload_resume(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiFailure> {
    receive_upload(multipart, &state.root, &state.resumes_dir)
        .await
        .map(Json)
}

async fn receive_upload(
    mut multipart: Multipart,
    root: &Path,
    dir: &Path,
) -> Result<UploadResponse, ApiFailure> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(e.body_text()))?;
        return store_upload(root, dir, &original, &bytes).await;
    }
    Err(bad_request("No file part"))
}

/// Save into `dir` with a random hex name that keeps the original extension.
/// The returned path is relative to `root` when `dir` is below it.
async fn store_upload(
    root: &Path,
    dir: &Path,
    original_name: &str,
    bytes: &[u8],
) -> Result<UploadResponse, ApiFailure> {
    if original_name.is_empty() {
        return Err(bad_request("No selected file"));
    }
    let Some(ext) = allowed_extension(original_name) else {
        return Err(bad_request("File type not allowed"));
    };

    let filename = format!("{}.{ext}", Uuid::new_v4().simple());
    tokio::fs::create_dir_all(dir).await.map_err(internal_error)?;
    tokio::fs::write(dir.join(&filename), bytes)
        .await
        .map_err(internal_error)?;

    let path = dir.strip_prefix(root).unwrap_or(dir).join(&filename);
    let path = path.to_string_lossy().replace('\\', "/");
    tracing::info!("Stored upload '{original_name}' as {path}");

    Ok(UploadResponse { path, filename })
}

fn allowed_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

async fn clear_chat(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.service.clear_history().await {
        Ok(_) => ok_message("Chat history cleared (table truncated)."),
        Err(e) => {
            tracing::error!("Failed to clear chat history: {e}");
            failure(e)
        }
    }
}

async fn clear_knowledge(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.service.clear_knowledge().await {
        Ok(_) => ok_message("Knowledge DB cleared and resumes removed where possible."),
        Err(e) => {
            tracing::error!("Failed to clear knowledge DB: {e}");
            failure(e)
        }
    }
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<Vec<Session>>, ApiFailure> {
    let user_id = query.user_id.as_deref().unwrap_or(DEFAULT_USER_ID);
    state
        .service
        .sessions(user_id)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))))
}

fn ok_message(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "ok": true, "message": message })))
}

fn failure(e: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "ok": false, "error": e.to_string() })),
    )
}

fn bad_request(message: impl Into<String>) -> ApiFailure {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message.into() })))
}

fn internal_error(e: std::io::Error) -> ApiFailure {
    tracing::error!("Failed to store upload: {e}");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() })))
}
