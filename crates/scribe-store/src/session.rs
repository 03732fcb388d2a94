//! Conversation sessions persisted in the `sessions` table.
//!
//! One document per session, keyed by `(app_name, user_id, id)`, holding the
//! session state and its events in append order. Sessions handed out by the
//! store are detached copies: changing one does nothing on disk until it goes
//! back through [`SessionStore::append`].

use crate::db::{Document, JsonDb, field_is, to_document};
use crate::error::StoreError;
use scribe_types::Event;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use uuid::Uuid;

const TABLE: &str = "sessions";

/// A persisted conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl Session {
    /// An empty session with the given identity.
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            app_name: app_name.into(),
            user_id: user_id.into(),
            state: Map::new(),
            events: Vec::new(),
        }
    }
}

/// Session persistence over a single JSON document file.
pub struct SessionStore {
    db: JsonDb,
}

impl SessionStore {
    /// Open the store backed by the file at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let db = JsonDb::open(path).await?;
        tracing::debug!("Chat session store connected to '{}'", db.path().display());
        Ok(Self { db })
    }

    /// Create a session, generating an id when none is given. A record with
    /// the same id is overwritten.
    pub async fn create(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
        state: Option<Map<String, Value>>,
    ) -> Result<Session, StoreError> {
        let id = match session_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        let mut session = Session::new(app_name, user_id, id);
        session.state = state.unwrap_or_default();

        let record = to_document(&session)?;
        let id = session.id.clone();
        self.db
            .write(TABLE, |t| t.upsert(record, field_is("id", &id)))
            .await?;
        tracing::debug!("Created chat session {}", session.id);
        Ok(session)
    }

    /// Look up a session by its full identity, with all events in order.
    pub async fn get(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>, StoreError> {
        let record = self
            .db
            .read(TABLE, |t| {
                t.get(|d| matches_identity(d, app_name, user_id, session_id))
                    .cloned()
            })
            .await;

        let Some(record) = record else {
            return Ok(None);
        };
        let session: Session = serde_json::from_value(Value::Object(record))?;
        tracing::debug!(
            "Loaded chat session {} with {} events.",
            session.id,
            session.events.len()
        );
        Ok(Some(session))
    }

    /// Fetch the session, creating an empty one if it does not exist yet.
    pub async fn get_or_create(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Session, StoreError> {
        match self.get(app_name, user_id, session_id).await? {
            Some(session) => Ok(session),
            None => self.create(app_name, user_id, Some(session_id), None).await,
        }
    }

    /// Append an event to `session` and to its persisted record.
    ///
    /// The stored event list and state are replaced in one table write. If the
    /// record has been deleted in the meantime only the in-memory session
    /// changes.
    pub async fn append(&self, session: &mut Session, event: Event) -> Result<(), StoreError> {
        let event_value = serde_json::to_value(&event)?;
        session.events.push(event);

        let state = Value::Object(session.state.clone());
        let id = session.id.clone();
        let found = self
            .db
            .write(TABLE, |t| {
                let Some(current) = t.get(field_is("id", &id)) else {
                    return false;
                };
                let mut events = current
                    .get("events")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                events.push(event_value);

                let mut fields = Document::new();
                fields.insert("events".into(), Value::Array(events));
                fields.insert("state".into(), state);
                t.update(&fields, field_is("id", &id));
                true
            })
            .await?;

        if !found {
            tracing::debug!("Session {} has no stored record; event kept in memory only", id);
        }
        Ok(())
    }

    /// Remove the session record(s) with this identity. Missing is not an error.
    pub async fn delete(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), StoreError> {
        tracing::debug!("Deleting session {session_id}...");
        let removed = self
            .db
            .write(TABLE, |t| {
                t.remove(|d| matches_identity(d, app_name, user_id, session_id))
            })
            .await?;
        tracing::debug!("Removed {removed} record(s) for session {session_id}");
        Ok(())
    }

    /// List a user's sessions without their events.
    pub async fn list(&self, app_name: &str, user_id: &str) -> Result<Vec<Session>, StoreError> {
        tracing::debug!("Listing sessions for user {user_id}...");
        let headers: Vec<Document> = self
            .db
            .read(TABLE, |t| {
                t.search(|d| {
                    field_is("app_name", app_name)(d) && field_is("user_id", user_id)(d)
                })
                .into_iter()
                .map(|d| {
                    let mut header = d.clone();
                    header.remove("events");
                    header
                })
                .collect()
            })
            .await;

        let mut sessions = Vec::with_capacity(headers.len());
        for header in headers {
            match serde_json::from_value::<Session>(Value::Object(header)) {
                Ok(session) => sessions.push(session),
                Err(e) => tracing::warn!("Skipping unreadable session record: {e}"),
            }
        }
        Ok(sessions)
    }

    /// Drop every session ("clear history"). Returns how many were removed.
    pub async fn clear(&self) -> Result<usize, StoreError> {
        self.db
            .write(TABLE, |t| {
                let n = t.len();
                t.truncate();
                n
            })
            .await
    }
}

fn matches_identity(doc: &Document, app_name: &str, user_id: &str, session_id: &str) -> bool {
    field_is("app_name", app_name)(doc)
        && field_is("user_id", user_id)(doc)
        && field_is("id", session_id)(doc)
}
