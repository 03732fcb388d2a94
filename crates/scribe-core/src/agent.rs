//! The tool loop that drives one conversational turn.

use crate::history::build_messages;
use crate::prompt::AGENT_NAME;
use scribe_store::{Session, SessionStore};
use scribe_tools::ToolRegistry;
use scribe_types::{
    Author, Content, ContentBlock, CreateMessageRequest, Event, Part, ScribeError, ToolContext,
    ToolOutput, Usage, provider::Provider,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Maximum number of consecutive tool-use loops in one turn.
pub const MAX_TOOL_LOOPS: usize = 25;

/// Progress reported while a turn runs.
#[derive(Debug)]
pub enum AgentEvent {
    /// An event was appended to the session.
    Appended(Event),
    /// A tool is about to be executed.
    ToolStart { name: String },
    /// A tool has finished executing.
    ToolEnd {
        name: String,
        output: String,
        is_error: bool,
    },
    /// The model answered without requesting more tools.
    Done(Usage),
    /// The turn stopped after [`MAX_TOOL_LOOPS`] tool rounds.
    LoopLimit,
    /// The turn was cancelled (e.g. Ctrl+C).
    Cancelled,
}

/// Relays a session between the model and the tools.
pub struct Agent {
    provider: Arc<dyn Provider>,
    registry: ToolRegistry,
    model: String,
    max_tokens: u32,
    system_prompt: Option<String>,
    name: String,
    root: PathBuf,
}

impl Agent {
    /// `root` resolves relative file references and is handed to tools.
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: ToolRegistry,
        model: String,
        max_tokens: u32,
        root: PathBuf,
    ) -> Self {
        Self {
            provider,
            registry,
            model,
            max_tokens,
            system_prompt: None,
            name: AGENT_NAME.to_string(),
            root,
        }
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run one turn: record `new_message`, then call the model and its tools
    /// until it answers without tool calls.
    ///
    /// Every event goes through [`SessionStore::append`] before it is reported
    /// to `on_event`. On cancellation or a model error, whatever was appended
    /// so far stays in the session.
    pub async fn run<F>(
        &self,
        session: &mut Session,
        store: &SessionStore,
        new_message: Content,
        cancel: CancellationToken,
        mut on_event: F,
    ) -> Result<Usage, ScribeError>
    where
        F: FnMut(AgentEvent),
    {
        let mut usage = Usage::default();

        if cancel.is_cancelled() {
            on_event(AgentEvent::Cancelled);
            return Err(ScribeError::Cancelled);
        }
        let user_event = Event::new(Author::User, new_message);
        store.append(session, user_event.clone()).await?;
        on_event(AgentEvent::Appended(user_event));

        for _ in 0..MAX_TOOL_LOOPS {
            let request = CreateMessageRequest {
                model: self.model.clone(),
                max_tokens: self.max_tokens,
                messages: build_messages(&session.events, &self.root).await,
                system: self.system_prompt.clone(),
                tools: Some(self.registry.definitions()).filter(|d| !d.is_empty()),
                temperature: None,
            };

            let response = tokio::select! {
                _ = cancel.cancelled() => {
                    on_event(AgentEvent::Cancelled);
                    return Err(ScribeError::Cancelled);
                }
                result = self.provider.create_message(&request) => result?,
            };
            usage.add(&response.usage);

            let mut parts = Vec::new();
            for block in response.content {
                match block {
                    ContentBlock::Text { text } if !text.is_empty() => parts.push(Part::Text { text }),
                    ContentBlock::ToolUse { id, name, input } => {
                        parts.push(Part::ToolCall { id, name, input })
                    }
                    _ => {}
                }
            }
            let reply = Event::new(Author::Agent(self.name.clone()), parts);
            let tool_calls = reply.tool_calls();
            store.append(session, reply.clone()).await?;
            on_event(AgentEvent::Appended(reply));

            if tool_calls.is_empty() {
                on_event(AgentEvent::Done(usage.clone()));
                return Ok(usage);
            }

            let ctx = ToolContext {
                root: self.root.clone(),
            };
            let mut results = Vec::with_capacity(tool_calls.len());
            for (id, name, input) in tool_calls {
                on_event(AgentEvent::ToolStart { name: name.clone() });
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => {
                        on_event(AgentEvent::Cancelled);
                        return Err(ScribeError::Cancelled);
                    }
                    outcome = self.registry.execute(&name, input, ctx.clone()) => outcome,
                };
                let output = outcome.unwrap_or_else(|e| ToolOutput::error(e.to_string()));
                tracing::debug!("Tool {name} finished (error: {})", output.is_error);

                on_event(AgentEvent::ToolEnd {
                    name,
                    output: scribe_types::truncate_string(&output.text, 200),
                    is_error: output.is_error,
                });
                results.push(Part::ToolResult {
                    tool_call_id: id,
                    output: output.text,
                    is_error: output.is_error,
                });
            }

            let tool_event = Event::new(Author::Tool, results);
            store.append(session, tool_event.clone()).await?;
            on_event(AgentEvent::Appended(tool_event));
        }

        tracing::warn!("Stopping turn after {MAX_TOOL_LOOPS} tool loops");
        on_event(AgentEvent::LoopLimit);
        Ok(usage)
    }
}

/// Display text of an assistant event: its text parts, without tool markers.
pub fn event_text(event: &Event) -> String {
    match &event.content {
        Content::Text(text) => text.trim().to_string(),
        Content::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
    }
}
