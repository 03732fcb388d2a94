//! A small embedded document collection persisted as one JSON file.
//!
//! The file maps table names to `{doc_id: document}` objects:
//!
//! ```text
//! {"sessions": {"1": {"id": "s1", ...}, "2": {...}}}
//! ```
//!
//! Document ids are assigned in insertion order, so iterating a table yields
//! documents in the order they were first inserted. Each write rewrites the
//! whole file through a temp file and rename. Only one process may own a file.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

/// One named table of documents keyed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table {
    docs: BTreeMap<u64, Document>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// All documents in insertion order.
    pub fn all(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    /// Every document matching `pred`, in insertion order.
    pub fn search(&self, pred: impl Fn(&Document) -> bool) -> Vec<&Document> {
        self.docs.values().filter(|d| pred(d)).collect()
    }

    /// First document matching `pred`.
    pub fn get(&self, pred: impl Fn(&Document) -> bool) -> Option<&Document> {
        self.docs.values().find(|d| pred(d))
    }

    pub fn contains(&self, pred: impl Fn(&Document) -> bool) -> bool {
        self.get(pred).is_some()
    }

    /// Insert a new document and return its id.
    pub fn insert(&mut self, doc: Document) -> u64 {
        let id = self.docs.keys().next_back().map_or(1, |last| last + 1);
        self.docs.insert(id, doc);
        id
    }

    /// Merge `fields` into every document matching `pred`. Returns the number
    /// of documents touched.
    pub fn update(&mut self, fields: &Document, pred: impl Fn(&Document) -> bool) -> usize {
        let mut touched = 0;
        for doc in self.docs.values_mut().filter(|d| pred(&**d)) {
            for (key, value) in fields {
                doc.insert(key.clone(), value.clone());
            }
            touched += 1;
        }
        touched
    }

    /// Update all matches with `doc`, or insert it when nothing matches.
    pub fn upsert(&mut self, doc: Document, pred: impl Fn(&Document) -> bool) {
        if self.update(&doc, &pred) == 0 {
            self.insert(doc);
        }
    }

    /// Remove every document matching `pred`. Returns the number removed.
    pub fn remove(&mut self, pred: impl Fn(&Document) -> bool) -> usize {
        let before = self.docs.len();
        self.docs.retain(|_, d| !pred(d));
        before - self.docs.len()
    }

    /// Drop every document.
    pub fn truncate(&mut self) {
        self.docs.clear();
    }
}

/// Predicate matching documents whose string field `key` equals `value`.
pub fn field_is<'a>(key: &'a str, value: &'a str) -> impl Fn(&Document) -> bool + 'a {
    move |doc| doc.get(key).and_then(Value::as_str) == Some(value)
}

/// Serialize a record into a document.
pub(crate) fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::Serialization(serde::ser::Error::custom(
            "record did not serialize to a JSON object",
        ))),
    }
}

/// A JSON file holding named tables.
pub struct JsonDb {
    path: PathBuf,
    tables: Mutex<BTreeMap<String, Table>>,
}

impl JsonDb {
    /// Open (or create) the database at `path`.
    ///
    /// A missing or blank file is an empty database. A file that does not
    /// parse as a table collection is rejected rather than overwritten.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tables = match tokio::fs::read_to_string(&path).await {
            Ok(data) if data.trim().is_empty() => BTreeMap::new(),
            Ok(data) => serde_json::from_str(&data).map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!("Opened document store {}", path.display());
        Ok(Self {
            path,
            tables: Mutex::new(tables),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a read-only closure against a table. Unknown tables read as empty.
    pub async fn read<R>(&self, table: &str, f: impl FnOnce(&Table) -> R) -> R {
        let tables = self.tables.lock().await;
        match tables.get(table) {
            Some(t) => f(t),
            None => f(&Table::default()),
        }
    }

    /// Run a mutating closure against a table and persist the result before
    /// returning. If the file cannot be written, the in-memory table is left
    /// as it was.
    pub async fn write<R>(
        &self,
        table: &str,
        f: impl FnOnce(&mut Table) -> R,
    ) -> Result<R, StoreError> {
        let mut tables = self.tables.lock().await;
        let mut working = tables.get(table).cloned().unwrap_or_default();
        let out = f(&mut working);

        let previous = tables.insert(table.to_string(), working);
        if let Err(e) = self.persist(&tables).await {
            match previous {
                Some(prev) => {
                    tables.insert(table.to_string(), prev);
                }
                None => {
                    tables.remove(table);
                }
            }
            return Err(e);
        }
        Ok(out)
    }

    async fn persist(&self, tables: &BTreeMap<String, Table>) -> Result<(), StoreError> {
        let json = serde_json::to_string(tables)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}
