//! Conversation runtime for Scribe: the tool loop over session events and
//! the chat service the front ends talk to.

mod agent;
mod history;
mod prompt;
mod service;

pub use agent::{Agent, AgentEvent, MAX_TOOL_LOOPS, event_text};
pub use history::build_messages;
pub use prompt::{AGENT_NAME, SYSTEM_INSTRUCTION};
pub use service::{ChatService, KnowledgeCleared, clear_knowledge, compose_message};
