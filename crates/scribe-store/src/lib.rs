//! Persistence for Scribe: an embedded JSON document collection, the
//! session store built on it, and the knowledge store of file summaries.

pub mod db;
pub mod error;
pub mod knowledge;
pub mod session;

pub use db::{Document, JsonDb, Table};
pub use error::StoreError;
pub use knowledge::{KnowledgeEntry, KnowledgeStore, NO_KNOWLEDGE_MESSAGE};
pub use session::{Session, SessionStore};
