//! Tool registry and the document, knowledge and GitHub tools for Scribe.

pub mod attachment;
mod github;
mod registry;
mod resumes;
mod summarizer;

pub use attachment::{AttachmentKind, load_attachment};
pub use github::{
    GithubClient, GithubProfileTool, GithubRepo, GithubUser, MISSING_USERNAME_MESSAGE,
    ProfileSummary,
};
pub use registry::{ToolDeps, ToolRegistry};
pub use resumes::{
    ProcessSingleResumeTool, ProcessStaticResumesTool, QueryKnowledgeBaseTool, ResumeProcessor,
    attempt_move_to_processed,
};
pub use summarizer::{SourceKind, Summarizer};
