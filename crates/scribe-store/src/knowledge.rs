//! Summaries of source documents, one entry per file name.

use crate::db::{JsonDb, field_is, to_document};
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write;
use std::path::PathBuf;

const TABLE: &str = "knowledge";

/// Returned by [`KnowledgeStore::render_all`] when nothing is stored.
pub const NO_KNOWLEDGE_MESSAGE: &str =
    "No knowledge has been stored yet. Please run the processing tool.";

/// A generated summary of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub file_name: String,
    pub summary: String,
    #[serde(rename = "type")]
    pub source_type: String,
}

/// Persistent store of file summaries, separate from chat history.
pub struct KnowledgeStore {
    db: JsonDb,
}

impl KnowledgeStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let db = JsonDb::open(path).await?;
        tracing::debug!("Knowledge store connected to '{}'", db.path().display());
        Ok(Self { db })
    }

    /// Save or replace the summary for `file_name`.
    pub async fn save_summary(
        &self,
        file_name: &str,
        summary: &str,
        source_type: &str,
    ) -> Result<(), StoreError> {
        let entry = KnowledgeEntry {
            file_name: file_name.to_string(),
            summary: summary.to_string(),
            source_type: source_type.to_string(),
        };
        let record = to_document(&entry)?;
        self.db
            .write(TABLE, |t| t.upsert(record, field_is("file_name", file_name)))
            .await?;
        tracing::info!("Saved summary for: {file_name}");
        Ok(())
    }

    pub async fn has_summary(&self, file_name: &str) -> bool {
        self.db
            .read(TABLE, |t| t.contains(field_is("file_name", file_name)))
            .await
    }

    pub async fn get_summary(&self, file_name: &str) -> Option<KnowledgeEntry> {
        self.db
            .read(TABLE, |t| {
                t.get(field_is("file_name", file_name))
                    .and_then(|d| serde_json::from_value(Value::Object(d.clone())).ok())
            })
            .await
    }

    /// Every entry in the order it was first saved. Unreadable records are skipped.
    pub async fn entries(&self) -> Vec<KnowledgeEntry> {
        self.db
            .read(TABLE, |t| {
                t.all()
                    .filter_map(|d| serde_json::from_value(Value::Object(d.clone())).ok())
                    .collect()
            })
            .await
    }

    /// All entries as one text block for a prompt context.
    pub async fn render_all(&self) -> String {
        render(&self.entries().await)
    }

    /// Drop every entry ("clear knowledge"). Source files are not touched.
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

fn render(entries: &[KnowledgeEntry]) -> String {
    if entries.is_empty() {
        return NO_KNOWLEDGE_MESSAGE.to_string();
    }
    let mut out = String::from("Here is the current knowledge base:\n\n");
    for entry in entries {
        let _ = writeln!(out, "--- START OF DOC: {} ---", entry.file_name);
        let _ = writeln!(out, "TYPE: {}", entry.source_type);
        let _ = writeln!(out, "SUMMARY: {}", entry.summary);
        let _ = writeln!(out, "--- END OF DOC: {} ---\n", entry.file_name);
    }
    out
}
