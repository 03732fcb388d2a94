//! Résumé processing and knowledge-base tools.
//!
//! Processing a file means: summarize it through the model, store the summary
//! under the file's base name, then move the file into a sibling `processed/`
//! folder so a later directory sweep does not pick it up again.

use crate::summarizer::{SourceKind, Summarizer};
use scribe_store::KnowledgeStore;
use scribe_types::{Tool, ToolContext, ToolDefinition, ToolError, ToolFuture, ToolOutput};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared by the single-file and directory tools.
pub struct ResumeProcessor {
    knowledge: Arc<KnowledgeStore>,
    summarizer: Summarizer,
}

impl ResumeProcessor {
    pub fn new(knowledge: Arc<KnowledgeStore>, summarizer: Summarizer) -> Self {
        Self {
            knowledge,
            summarizer,
        }
    }

    /// Process one file and describe the outcome in a sentence.
    pub async fn process_file(&self, path: &Path) -> ToolOutput {
        let display = path.display();
        if !tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return ToolOutput::error(format!("Error: file '{display}' does not exist."));
        }

        let name = file_name(path);
        if self.knowledge.has_summary(&name).await {
            return ToolOutput::text(format!("Skipped: '{name}' already processed."));
        }
        let Some(kind) = SourceKind::classify(&name) else {
            return ToolOutput::text(format!("Skipped: unsupported file type for '{name}'."));
        };

        match self.summarize_and_save(path, &name, kind).await {
            Ok(()) => {
                attempt_move_to_processed(path).await;
                ToolOutput::text(format!("Processed: {name}"))
            }
            Err(e) => ToolOutput::error(format!("Error processing '{display}': {e}")),
        }
    }

    /// Process every supported, not yet summarized file directly inside `dir`.
    pub async fn process_dir(&self, dir: &Path) -> ToolOutput {
        let display = dir.display();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(_) => {
                return ToolOutput::error(format!("Error: The directory '{display}' does not exist."));
            }
        };

        let mut files = Vec::new();
        let mut any_entry = false;
        while let Ok(Some(entry)) = entries.next_entry().await {
            any_entry = true;
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                files.push(entry.path());
            }
        }
        if !any_entry {
            return ToolOutput::text(format!("No files found in '{display}' to process."));
        }
        files.sort();

        let mut processed = 0;
        let mut failures = Vec::new();
        for path in files {
            let name = file_name(&path);
            let Some(kind) = SourceKind::classify(&name) else {
                continue;
            };
            if self.knowledge.has_summary(&name).await {
                tracing::debug!("Skipping {name}: already processed");
                continue;
            }

            tracing::info!("Processing {name}...");
            match self.summarize_and_save(&path, &name, kind).await {
                Ok(()) => {
                    attempt_move_to_processed(&path).await;
                    processed += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to process {name}: {e}");
                    failures.push(format!("Error processing '{}': {e}", path.display()));
                }
            }
        }

        let mut text = if processed == 0 {
            "No new supported files (PDF/Image) found in the 'resumes' folder.".to_string()
        } else {
            format!("Successfully processed and saved summaries for {processed} files.")
        };
        for failure in &failures {
            text.push('\n');
            text.push_str(failure);
        }
        ToolOutput {
            text,
            is_error: processed == 0 && !failures.is_empty(),
        }
    }

    async fn summarize_and_save(
        &self,
        path: &Path,
        name: &str,
        kind: SourceKind,
    ) -> Result<(), String> {
        let summary = self.summarizer.summarize(path, kind).await?;
        self.knowledge
            .save_summary(name, &summary, kind.label())
            .await
            .map_err(|e| e.to_string())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Move a processed file into `<its dir>/processed/`. Never fails: problems
/// are logged and reported through the return value only.
pub async fn attempt_move_to_processed(path: &Path) -> bool {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        tracing::debug!("Not moving {}: no parent directory", path.display());
        return false;
    };
    let target_dir = parent.join("processed");
    if let Err(e) = tokio::fs::create_dir_all(&target_dir).await {
        tracing::warn!("Could not create {}: {e}", target_dir.display());
        return false;
    }
    let target = target_dir.join(name);
    match tokio::fs::rename(path, &target).await {
        Ok(()) => {
            tracing::debug!("Moved {} to {}", path.display(), target.display());
            true
        }
        Err(e) => {
            tracing::warn!("Could not move {} to processed/: {e}", path.display());
            false
        }
    }
}

#[derive(Deserialize)]
struct SingleInput {
    file_path: String,
}

/// Processes one uploaded or named file.
pub struct ProcessSingleResumeTool {
    processor: Arc<ResumeProcessor>,
}

impl ProcessSingleResumeTool {
    pub fn new(processor: Arc<ResumeProcessor>) -> Self {
        Self { processor }
    }
}

impl Tool for ProcessSingleResumeTool {
    fn name(&self) -> &str {
        "process_single_resume_tool"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Process a single resume or image file: summarize it and save the \
                          summary to the knowledge base. Use this for a newly uploaded file."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "required": ["file_path"],
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file, absolute or relative to the project root"
                    }
                }
            }),
        }
    }

    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async move {
            let input: SingleInput =
                serde_json::from_value(input).map_err(|e| ToolError::InvalidInput {
                    tool: self.name().into(),
                    message: e.to_string(),
                })?;
            Ok(self.processor.process_file(&ctx.resolve(&input.file_path)).await)
        })
    }
}

/// Sweeps the configured résumé folder.
pub struct ProcessStaticResumesTool {
    processor: Arc<ResumeProcessor>,
    dir: PathBuf,
}

impl ProcessStaticResumesTool {
    pub fn new(processor: Arc<ResumeProcessor>, dir: impl Into<PathBuf>) -> Self {
        Self {
            processor,
            dir: dir.into(),
        }
    }
}

impl Tool for ProcessStaticResumesTool {
    fn name(&self) -> &str {
        "process_static_resumes_tool"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Process all PDF and image files in the 'resumes' folder that have not \
                          been processed yet, saving a summary of each to the knowledge base."
                .to_string(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async move {
            tracing::debug!("process_static_resumes_tool on '{}'", self.dir.display());
            Ok(self.processor.process_dir(&self.dir).await)
        })
    }
}

/// Returns every stored summary as one text block.
pub struct QueryKnowledgeBaseTool {
    knowledge: Arc<KnowledgeStore>,
}

impl QueryKnowledgeBaseTool {
    pub fn new(knowledge: Arc<KnowledgeStore>) -> Self {
        Self { knowledge }
    }
}

impl Tool for QueryKnowledgeBaseTool {
    fn name(&self) -> &str {
        "query_knowledge_base_tool"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Retrieve all stored file summaries (resumes, images) from the \
                          knowledge base."
                .to_string(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async move { Ok(ToolOutput::text(self.knowledge.render_all().await)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_store::NO_KNOWLEDGE_MESSAGE;
    use scribe_types::provider::Provider;
    use scribe_types::{
        ApiError, ContentBlock, CreateMessageRequest, CreateMessageResponse, Role, Usage,
    };
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Replies with a fixed summary, or fails when `fail` is set.
    struct StubProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Provider for StubProvider {
        fn create_message<'a>(
            &'a self,
            request: &'a CreateMessageRequest,
        ) -> Pin<Box<dyn Future<Output = Result<CreateMessageResponse, ApiError>> + Send + 'a>>
        {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    return Err(ApiError::Overloaded);
                }
                let prompt = match request.messages[0].content.last() {
                    Some(ContentBlock::Text { text }) => text.clone(),
                    _ => String::new(),
                };
                Ok(CreateMessageResponse {
                    id: "msg".into(),
                    role: Role::Assistant,
                    content: vec![ContentBlock::Text {
                        text: format!("summary for: {prompt}"),
                    }],
                    model: request.model.clone(),
                    stop_reason: None,
                    usage: Usage::default(),
                })
            })
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    struct Fixture {
        tmp: TempDir,
        knowledge: Arc<KnowledgeStore>,
        provider: Arc<StubProvider>,
        processor: ResumeProcessor,
    }

    async fn fixture(fail: bool) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let knowledge = Arc::new(
            KnowledgeStore::open(tmp.path().join("knowledge_db.json"))
                .await
                .unwrap(),
        );
        let provider = Arc::new(StubProvider {
            calls: AtomicUsize::new(0),
            fail,
        });
        let summarizer = Summarizer::new(provider.clone(), "test-model", 512);
        let processor = ResumeProcessor::new(knowledge.clone(), summarizer);
        std::fs::create_dir_all(tmp.path().join("resumes")).unwrap();
        Fixture {
            tmp,
            knowledge,
            provider,
            processor,
        }
    }

    impl Fixture {
        fn resumes(&self) -> PathBuf {
            self.tmp.path().join("resumes")
        }

        fn put(&self, name: &str) -> PathBuf {
            let path = self.resumes().join(name);
            std::fs::write(&path, b"data").unwrap();
            path
        }
    }

    #[tokio::test]
    async fn single_file_is_summarized_and_moved() {
        let fx = fixture(false).await;
        let path = fx.put("jane.pdf");

        let out = fx.processor.process_file(&path).await;
        assert_eq!(out, ToolOutput::text("Processed: jane.pdf"));

        let entry = fx.knowledge.get_summary("jane.pdf").await.unwrap();
        assert_eq!(entry.source_type, "Resume (PDF)");
        assert!(entry.summary.contains("Summarize this resume."));
        assert!(!path.exists());
        assert!(fx.resumes().join("processed").join("jane.pdf").exists());
    }

    #[tokio::test]
    async fn single_file_outcomes() {
        let fx = fixture(false).await;
        let missing = fx.resumes().join("ghost.pdf");
        let out = fx.processor.process_file(&missing).await;
        assert!(out.is_error);
        assert_eq!(
            out.text,
            format!("Error: file '{}' does not exist.", missing.display())
        );

        let txt = fx.put("notes.txt");
        assert_eq!(
            fx.processor.process_file(&txt).await.text,
            "Skipped: unsupported file type for 'notes.txt'."
        );

        fx.knowledge
            .save_summary("old.png", "seen", "Image")
            .await
            .unwrap();
        let old = fx.put("old.png");
        assert_eq!(
            fx.processor.process_file(&old).await.text,
            "Skipped: 'old.png' already processed."
        );
        assert_eq!(fx.provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn model_failure_is_reported_as_text() {
        let fx = fixture(true).await;
        let path = fx.put("jane.pdf");
        let out = fx.processor.process_file(&path).await;
        assert!(out.is_error);
        assert!(out.text.starts_with(&format!("Error processing '{}': ", path.display())));
        assert!(path.exists(), "failed file stays in place");
        assert!(!fx.knowledge.has_summary("jane.pdf").await);
    }

    #[tokio::test]
    async fn directory_sweep() {
        let fx = fixture(false).await;
        fx.put("b.png");
        fx.put("a.pdf");
        fx.put("skip.docx");

        let out = fx.processor.process_dir(&fx.resumes()).await;
        assert_eq!(
            out.text,
            "Successfully processed and saved summaries for 2 files."
        );
        let names: Vec<_> = fx
            .knowledge
            .entries()
            .await
            .into_iter()
            .map(|e| e.file_name)
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.png"]);

        // Second sweep: only the unsupported file and processed/ remain.
        let out = fx.processor.process_dir(&fx.resumes()).await;
        assert_eq!(
            out.text,
            "No new supported files (PDF/Image) found in the 'resumes' folder."
        );
    }

    #[tokio::test]
    async fn directory_missing_or_empty() {
        let fx = fixture(false).await;
        let out = fx.processor.process_dir(&fx.resumes()).await;
        assert_eq!(
            out.text,
            format!("No files found in '{}' to process.", fx.resumes().display())
        );

        let gone = fx.tmp.path().join("nowhere");
        let out = fx.processor.process_dir(&gone).await;
        assert!(out.is_error);
        assert_eq!(
            out.text,
            format!("Error: The directory '{}' does not exist.", gone.display())
        );
    }

    #[tokio::test]
    async fn query_tool_renders_knowledge() {
        let fx = fixture(false).await;
        let tool = QueryKnowledgeBaseTool::new(fx.knowledge.clone());
        let ctx = ToolContext {
            root: fx.tmp.path().to_path_buf(),
        };
        let out = tool.execute(serde_json::json!({}), ctx.clone()).await.unwrap();
        assert_eq!(out.text, NO_KNOWLEDGE_MESSAGE);

        fx.knowledge.save_summary("a.pdf", "s", "Resume (PDF)").await.unwrap();
        let out = tool.execute(serde_json::json!({}), ctx).await.unwrap();
        assert!(out.text.contains("--- START OF DOC: a.pdf ---"));
    }

    #[tokio::test]
    async fn single_tool_resolves_relative_paths() {
        let fx = fixture(false).await;
        fx.put("jane.pdf");
        let tool = ProcessSingleResumeTool::new(Arc::new(fx.processor));
        let ctx = ToolContext {
            root: fx.tmp.path().to_path_buf(),
        };
        let out = tool
            .execute(serde_json::json!({"file_path": "resumes/jane.pdf"}), ctx.clone())
            .await
            .unwrap();
        assert_eq!(out.text, "Processed: jane.pdf");

        let err = tool.execute(serde_json::json!({}), ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn move_to_processed_reports_failure() {
        let tmp = TempDir::new().unwrap();
        assert!(!attempt_move_to_processed(&tmp.path().join("missing.pdf")).await);
    }
}
