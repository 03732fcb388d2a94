//! Tool trait and related types.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::ToolDefinition;

/// Context provided to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Project root that relative file paths are resolved against.
    pub root: PathBuf,
}

impl ToolContext {
    /// Resolve a possibly relative path against the project root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = PathBuf::from(path);
        if p.is_absolute() { p } else { self.root.join(p) }
    }
}

/// Result of executing a tool.
///
/// Failures the model should read (a missing file, an upstream HTTP error)
/// are reported here as text with `is_error` set, not as a `ToolError`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    /// Create a successful text output.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    /// Create an error text output.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ToolOutput, crate::error::ToolError>> + Send + 'a>>;

/// A callable the model can invoke during a conversation.
pub trait Tool: Send + Sync {
    /// The unique name of this tool (used in API requests).
    fn name(&self) -> &str;

    /// The tool definition to send to the API (name, description, input schema).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given JSON input and context.
    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> ToolFuture<'_>;
}
