//! Front door shared by the REPL and the HTTP server.

use crate::agent::{Agent, AgentEvent};
use scribe_store::{KnowledgeStore, Session, SessionStore};
use scribe_types::{Content, Part, ScribeError, Usage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Outcome of [`ChatService::clear_knowledge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnowledgeCleared {
    pub entries: usize,
    pub files_removed: usize,
}

/// Sessions, knowledge and the agent behind one application name.
pub struct ChatService {
    agent: Agent,
    sessions: Arc<SessionStore>,
    knowledge: Arc<KnowledgeStore>,
    app_name: String,
    resumes_dir: PathBuf,
    // One turn at a time: two turns on a session would interleave events.
    turn: Mutex<()>,
}

impl ChatService {
    pub fn new(
        agent: Agent,
        sessions: Arc<SessionStore>,
        knowledge: Arc<KnowledgeStore>,
        app_name: impl Into<String>,
        resumes_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            agent,
            sessions,
            knowledge,
            app_name: app_name.into(),
            resumes_dir: resumes_dir.into(),
            turn: Mutex::new(()),
        }
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    /// Run one turn in the given session, creating the session on first use.
    pub async fn send<F>(
        &self,
        user_id: &str,
        session_id: &str,
        message: Content,
        cancel: CancellationToken,
        on_event: F,
    ) -> Result<Usage, ScribeError>
    where
        F: FnMut(AgentEvent),
    {
        let _turn = self.turn.lock().await;
        // Cancelled while queued behind another turn.
        if cancel.is_cancelled() {
            return Err(ScribeError::Cancelled);
        }
        let mut session = self
            .sessions
            .get_or_create(&self.app_name, user_id, session_id)
            .await?;
        tracing::debug!(
            "Turn in session {session_id} ({} prior events)",
            session.events.len()
        );
        self.agent
            .run(&mut session, &self.sessions, message, cancel, on_event)
            .await
    }

    /// Build a user message from text and file references. Paths are kept as
    /// given; those that do not exist under the project root become a
    /// `[missing_file:path]` note.
    pub async fn compose(&self, text: &str, file_paths: &[String]) -> Content {
        compose_message(self.agent.root(), text, file_paths).await
    }

    /// Drop all chat history.
    pub async fn clear_history(&self) -> Result<usize, ScribeError> {
        let removed = self.sessions.clear().await?;
        tracing::info!("Cleared {removed} chat session(s)");
        Ok(removed)
    }

    /// Drop all summaries and, best effort, the résumé files they came from.
    pub async fn clear_knowledge(&self) -> Result<KnowledgeCleared, ScribeError> {
        clear_knowledge(&self.knowledge, &self.resumes_dir).await
    }

    pub async fn sessions(&self, user_id: &str) -> Result<Vec<Session>, ScribeError> {
        Ok(self.sessions.list(&self.app_name, user_id).await?)
    }

    pub async fn session(&self, user_id: &str, session_id: &str) -> Result<Option<Session>, ScribeError> {
        Ok(self.sessions.get(&self.app_name, user_id, session_id).await?)
    }

    pub async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<(), ScribeError> {
        Ok(self
            .sessions
            .delete(&self.app_name, user_id, session_id)
            .await?)
    }
}

/// Files first, then the text, as one structured message.
pub async fn compose_message(root: &Path, text: &str, file_paths: &[String]) -> Content {
    let mut parts = Vec::with_capacity(file_paths.len() + 1);
    for path in file_paths {
        let resolved = root.join(path);
        if tokio::fs::try_exists(&resolved).await.unwrap_or(false) {
            parts.push(Part::file(path.clone()));
        } else {
            tracing::warn!("Referenced file not found: {}", resolved.display());
            parts.push(Part::text(format!("[missing_file:{path}]")));
        }
    }
    if !text.is_empty() {
        parts.push(Part::text(text));
    }
    match parts.as_slice() {
        [] => Content::default(),
        [Part::Text { text }] => Content::Text(text.clone()),
        _ => Content::Parts(parts),
    }
}

/// Truncate the knowledge table, then remove files from `resumes_dir` and its
/// `processed/` folder. Files that cannot be removed are left in place.
pub async fn clear_knowledge(
    knowledge: &KnowledgeStore,
    resumes_dir: &Path,
) -> Result<KnowledgeCleared, ScribeError> {
    let entries = knowledge.clear().await?;
    let mut files_removed = remove_files_in(resumes_dir).await;
    files_removed += remove_files_in(&resumes_dir.join("processed")).await;
    tracing::info!("Cleared {entries} knowledge entries, removed {files_removed} file(s)");
    Ok(KnowledgeCleared {
        entries,
        files_removed,
    })
}

/// Remove the regular files directly inside `dir`; failures are logged and
/// skipped. Returns how many were removed.
async fn remove_files_in(dir: &Path) -> usize {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return 0;
    };
    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(e) => tracing::debug!("Could not remove {} (may be in use): {e}", path.display()),
        }
    }
    removed
}
