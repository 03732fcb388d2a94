//! Tool registry for name-based dispatch.

use crate::github::{GithubClient, GithubProfileTool};
use crate::resumes::{
    ProcessSingleResumeTool, ProcessStaticResumesTool, QueryKnowledgeBaseTool, ResumeProcessor,
};
use crate::summarizer::Summarizer;
use scribe_store::KnowledgeStore;
use scribe_types::{Tool, ToolContext, ToolDefinition, ToolError, ToolOutput};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything the built-in tools need.
pub struct ToolDeps {
    pub knowledge: Arc<KnowledgeStore>,
    pub summarizer: Summarizer,
    pub resumes_dir: PathBuf,
    pub github: GithubClient,
    pub github_username: Option<String>,
}

/// Registry of available tools, supporting name-based dispatch.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// The four assistant tools: single-file processing, directory
    /// processing, knowledge query and GitHub profile.
    pub fn with_defaults(deps: ToolDeps) -> Self {
        let processor = Arc::new(ResumeProcessor::new(deps.knowledge.clone(), deps.summarizer));
        let mut registry = Self::new();
        registry.register(Arc::new(ProcessSingleResumeTool::new(processor.clone())));
        registry.register(Arc::new(ProcessStaticResumesTool::new(
            processor,
            deps.resumes_dir,
        )));
        registry.register(Arc::new(QueryKnowledgeBaseTool::new(deps.knowledge)));
        registry.register(Arc::new(GithubProfileTool::new(
            deps.github_username,
            deps.github,
        )));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Tool definitions for the API, sorted by name so requests are stable.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool by name with the given input.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })?;
        tool.execute(input, ctx).await
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
