//! Rebuilding model messages from persisted session events.
//!
//! Users and tool results speak as the `user` role, agents as `assistant`;
//! system events are not sent. Consecutive turns with the same role are merged
//! so the request alternates roles. Tool calls and results are only sent in
//! matched pairs: a call interrupted before its result was stored (for
//! instance by cancellation) is dropped from the replay.

use scribe_tools::load_attachment;
use scribe_types::{
    Author, Content, ContentBlock, Event, Message, Part, Role, ToolResultContent,
};
use std::collections::HashSet;
use std::path::Path;

fn role_of(author: &Author) -> Option<Role> {
    match author {
        Author::User | Author::Tool => Some(Role::User),
        Author::Agent(_) => Some(Role::Assistant),
        Author::System => None,
    }
}

/// Provider messages for `events`. File parts are read from disk relative to
/// `root`; an unreadable file is replaced by a `[missing_file:path]` note.
pub async fn build_messages(events: &[Event], root: &Path) -> Vec<Message> {
    let mut calls = HashSet::new();
    let mut results = HashSet::new();
    for event in events {
        if let Content::Parts(parts) = &event.content {
            for part in parts {
                match part {
                    Part::ToolCall { id, .. } => {
                        calls.insert(id.clone());
                    }
                    Part::ToolResult { tool_call_id, .. } => {
                        results.insert(tool_call_id.clone());
                    }
                    _ => {}
                }
            }
        }
    }

    let mut messages: Vec<Message> = Vec::new();
    for event in events {
        let Some(role) = role_of(&event.author) else {
            continue;
        };

        let mut blocks = Vec::new();
        match &event.content {
            Content::Text(text) => push_text(&mut blocks, text),
            Content::Parts(parts) => {
                for part in parts {
                    match part {
                        Part::Text { text } => push_text(&mut blocks, text),
                        Part::File { path, .. } => blocks.push(file_block(path, root).await),
                        Part::ToolCall { id, name, input }
                            if role == Role::Assistant && results.contains(id) =>
                        {
                            blocks.push(ContentBlock::ToolUse {
                                id: id.clone(),
                                name: name.clone(),
                                input: input.clone(),
                            });
                        }
                        Part::ToolResult {
                            tool_call_id,
                            output,
                            is_error,
                        } if role == Role::User && calls.contains(tool_call_id) => {
                            blocks.push(ContentBlock::ToolResult {
                                tool_use_id: tool_call_id.clone(),
                                content: vec![ToolResultContent::Text {
                                    text: output.clone(),
                                }],
                                is_error: is_error.then_some(true),
                            });
                        }
                        Part::ToolCall { .. } | Part::ToolResult { .. } => {}
                    }
                }
            }
        }
        if blocks.is_empty() {
            continue;
        }

        match messages.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => messages.push(Message {
                role,
                content: blocks,
            }),
        }
    }

    // The API requires the conversation to open with a user turn.
    let leading = messages
        .iter()
        .take_while(|m| m.role == Role::Assistant)
        .count();
    messages.drain(..leading);
    messages
}

fn push_text(blocks: &mut Vec<ContentBlock>, text: &str) {
    if !text.trim().is_empty() {
        blocks.push(ContentBlock::Text {
            text: text.to_string(),
        });
    }
}

async fn file_block(path: &str, root: &Path) -> ContentBlock {
    let resolved = {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            root.join(p)
        }
    };
    match load_attachment(&resolved).await {
        Ok(block) => block,
        Err(e) => {
            tracing::warn!("Attachment {} unavailable: {e}", resolved.display());
            ContentBlock::Text {
                text: format!("[missing_file:{path}]"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn agent(content: impl Into<Content>) -> Event {
        Event::new(Author::Agent("document_agent".into()), content)
    }

    fn call(id: &str) -> Part {
        Part::ToolCall {
            id: id.into(),
            name: "query_knowledge_base_tool".into(),
            input: json!({}),
        }
    }

    fn result(id: &str) -> Part {
        Part::ToolResult {
            tool_call_id: id.into(),
            output: "kb".into(),
            is_error: false,
        }
    }

    #[tokio::test]
    async fn roles_alternate_and_merge() {
        let tmp = TempDir::new().unwrap();
        let events = vec![
            Event::new(Author::User, "first"),
            Event::new(Author::User, "second"),
            Event::new(Author::System, "ignored"),
            agent("reply"),
        ];
        let messages = build_messages(&events, tmp.path()).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content.len(), 2);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn tool_round_trip_is_replayed() {
        let tmp = TempDir::new().unwrap();
        let events = vec![
            Event::new(Author::User, "draft an email"),
            agent(vec![Part::text("checking"), call("t1")]),
            Event::new(Author::Tool, vec![result("t1")]),
            agent("Dear hiring manager"),
        ];
        let messages = build_messages(&events, tmp.path()).await;
        assert_eq!(messages.len(), 4);
        assert!(matches!(
            &messages[1].content[1],
            ContentBlock::ToolUse { id, .. } if id == "t1"
        ));
        assert_eq!(messages[2].role, Role::User);
        assert!(matches!(
            &messages[2].content[0],
            ContentBlock::ToolResult { tool_use_id, is_error: None, .. } if tool_use_id == "t1"
        ));
    }

    #[tokio::test]
    async fn unanswered_tool_call_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let events = vec![
            Event::new(Author::User, "hi"),
            agent(vec![call("t1")]),
            Event::new(Author::User, "never mind"),
        ];
        let messages = build_messages(&events, tmp.path()).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.len(), 2);
    }

    #[tokio::test]
    async fn files_are_loaded_or_marked_missing() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("user_upload")).unwrap();
        std::fs::write(tmp.path().join("user_upload/job.txt"), "Rust role").unwrap();

        let events = vec![Event::new(
            Author::User,
            vec![
                Part::file("user_upload/job.txt"),
                Part::file("user_upload/gone.pdf"),
                Part::text("write it"),
            ],
        )];
        let messages = build_messages(&events, tmp.path()).await;
        let blocks = &messages[0].content;
        assert!(matches!(&blocks[0], ContentBlock::Text { text } if text.ends_with("Rust role")));
        assert!(matches!(
            &blocks[1],
            ContentBlock::Text { text } if text == "[missing_file:user_upload/gone.pdf]"
        ));
        assert!(matches!(&blocks[2], ContentBlock::Text { text } if text == "write it"));
    }

    #[tokio::test]
    async fn leading_assistant_turns_are_dropped() {
        let tmp = TempDir::new().unwrap();
        let events = vec![agent("hello!"), Event::new(Author::User, "hi")];
        let messages = build_messages(&events, tmp.path()).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }
}
