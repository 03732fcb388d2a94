//! One-shot summaries of résumés and images through the model.

use crate::attachment::load_attachment;
use scribe_types::provider::Provider;
use scribe_types::{ContentBlock, CreateMessageRequest, Message, Role};
use std::path::Path;
use std::sync::Arc;

const RESUME_PROMPT: &str = "Summarize this resume. Extract Name, key skills, all work experience \
                             (company, role, dates), and education.";
const IMAGE_PROMPT: &str = "Describe this image in detail.";

/// What kind of source a file is, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    ResumePdf,
    Image,
}

impl SourceKind {
    /// `.pdf` is a résumé; `.jpg`, `.jpeg` and `.png` are images.
    pub fn classify(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(SourceKind::ResumePdf),
            "jpg" | "jpeg" | "png" => Some(SourceKind::Image),
            _ => None,
        }
    }

    /// The `type` recorded alongside the summary.
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::ResumePdf => "Resume (PDF)",
            SourceKind::Image => "Image",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            SourceKind::ResumePdf => RESUME_PROMPT,
            SourceKind::Image => IMAGE_PROMPT,
        }
    }
}

/// Sends a file plus an instruction to the model and returns the reply text.
#[derive(Clone)]
pub struct Summarizer {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: u32,
}

impl Summarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
        }
    }

    /// Summarize the file at `path` as `kind`. Errors are returned as display
    /// strings since callers fold them into tool output text.
    pub async fn summarize(&self, path: &Path, kind: SourceKind) -> Result<String, String> {
        let file = load_attachment(path).await.map_err(|e| e.to_string())?;
        let request = CreateMessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: Role::User,
                content: vec![
                    file,
                    ContentBlock::Text {
                        text: kind.prompt().to_string(),
                    },
                ],
            }],
            system: None,
            tools: None,
            temperature: None,
        };

        tracing::debug!(
            "Summarizing {} via {} ({})",
            path.display(),
            self.provider.name(),
            kind.label()
        );
        let response = self
            .provider
            .create_message(&request)
            .await
            .map_err(|e| e.to_string())?;
        Ok(response.text())
    }
}
