//! Conversation events as persisted in a session.
//!
//! An [`Event`] is one turn of a conversation. Its [`Content`] is either plain
//! text or a list of structured [`Part`]s. On disk, content is always a flat
//! JSON mapping with a `text` key, so any payload can be read back as text.
//! [`Content::from_value`] is the single, total coercion used on both the
//! write and the read path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Who produced an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Author {
    User,
    /// An assistant turn, tagged with the agent's name.
    Agent(String),
    /// Results of tool calls fed back to the model.
    Tool,
    System,
}

impl Author {
    pub fn as_str(&self) -> &str {
        match self {
            Author::User => "user",
            Author::Agent(name) => name,
            Author::Tool => "tool",
            Author::System => "system",
        }
    }

    pub fn is_agent(&self) -> bool {
        matches!(self, Author::Agent(_))
    }
}

impl From<String> for Author {
    fn from(s: String) -> Self {
        match s.as_str() {
            "user" => Author::User,
            "tool" => Author::Tool,
            "system" => Author::System,
            _ => Author::Agent(s),
        }
    }
}

impl From<Author> for String {
    fn from(author: Author) -> Self {
        match author {
            Author::Agent(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured piece of event content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    /// A reference to a local file attached to the turn.
    File {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    ToolCall {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_call_id: String,
        output: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Part::File {
            path: path.into(),
            mime_type: None,
        }
    }

    /// Flat text form of this part.
    pub fn flat_text(&self) -> String {
        match self {
            Part::Text { text } => text.clone(),
            Part::File { path, .. } => format!("[file:{path}]"),
            Part::ToolCall { name, .. } => format!("[tool_call:{name}]"),
            Part::ToolResult { output, .. } => output.clone(),
        }
    }

    /// Lenient decode. Untagged `{"text": ...}` mappings are accepted as text
    /// parts; anything unrecognised becomes a text part holding its JSON.
    pub fn from_value(value: Value) -> Self {
        if let Value::Object(map) = &value {
            if map.contains_key("type") {
                if let Ok(part) = serde_json::from_value::<Part>(value.clone()) {
                    return part;
                }
            } else if let Some(text) = map.get("text") {
                return Part::Text {
                    text: stringify(text),
                };
            }
        }
        Part::Text {
            text: stringify(&value),
        }
    }
}

/// Content of an event: plain text or structured parts.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Parts(Vec<Part>),
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

impl Content {
    /// Flat textual form, always available regardless of the variant.
    pub fn text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Parts(parts) => parts
                .iter()
                .map(Part::flat_text)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Structured view. Plain text is a single text part.
    pub fn parts(&self) -> Vec<Part> {
        match self {
            Content::Text(text) => vec![Part::text(text.clone())],
            Content::Parts(parts) => parts.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(text) => text.is_empty(),
            Content::Parts(parts) => parts.is_empty(),
        }
    }

    /// Canonical persisted mapping.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("text".into(), Value::String(self.text()));
        if let Content::Parts(parts) = self {
            let parts = parts
                .iter()
                .map(|p| serde_json::to_value(p).unwrap_or_else(|_| Value::String(p.flat_text())))
                .collect();
            map.insert("parts".into(), Value::Array(parts));
        }
        Value::Object(map)
    }

    /// Coerce any JSON value into content. Never fails; shapes it does not
    /// understand degrade to their text form.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) => {
                if let Some(Value::Array(parts)) = map.remove("parts") {
                    return Content::Parts(parts.into_iter().map(Part::from_value).collect());
                }
                match map.remove("text") {
                    Some(text) => Content::Text(stringify(&text)),
                    None if map.is_empty() => Content::default(),
                    None => Content::Text(Value::Object(map).to_string()),
                }
            }
            other => Content::Text(stringify(&other)),
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<Vec<Part>> for Content {
    fn from(parts: Vec<Part>) -> Self {
        Content::Parts(parts)
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Content::from_value(value)
    }
}

impl Serialize for Content {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Content::from_value)
    }
}

/// One persisted turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub author: Author,
    #[serde(default)]
    pub content: Content,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// A new event stamped with a fresh id and the current time.
    pub fn new(author: Author, content: impl Into<Content>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            author,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Flat text of the event's content.
    pub fn text(&self) -> String {
        self.content.text()
    }

    /// Tool calls requested in this event as `(id, name, input)`.
    pub fn tool_calls(&self) -> Vec<(String, String, Value)> {
        match &self.content {
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    Part::ToolCall { id, name, input } => {
                        Some((id.clone(), name.clone(), input.clone()))
                    }
                    _ => None,
                })
                .collect(),
            Content::Text(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mapping_with_text_keeps_text() {
        let content = Content::from_value(json!({"text": "hello"}));
        assert_eq!(content, Content::Text("hello".into()));
        assert_eq!(content.text(), "hello");
    }

    #[test]
    fn number_degrades_to_text() {
        let content = Content::from_value(json!(42));
        assert_eq!(content.to_value(), json!({"text": "42"}));
    }

    #[test]
    fn bare_string_and_null() {
        assert_eq!(Content::from_value(json!("hi")).text(), "hi");
        assert_eq!(Content::from_value(Value::Null), Content::default());
    }

    #[test]
    fn unknown_mapping_degrades_to_its_json() {
        let content = Content::from_value(json!({"foo": 1}));
        assert_eq!(content.text(), r#"{"foo":1}"#);
    }

    #[test]
    fn non_string_text_is_stringified() {
        let content = Content::from_value(json!({"text": [1, 2]}));
        assert_eq!(content.text(), "[1,2]");
    }

    #[test]
    fn parts_roundtrip_through_value() {
        let content = Content::Parts(vec![
            Part::file("resumes/cv.pdf"),
            Part::text("Write a cover letter"),
        ]);
        let value = content.to_value();
        assert_eq!(value["text"], "[file:resumes/cv.pdf]\nWrite a cover letter");
        assert_eq!(Content::from_value(value), content);
    }

    #[test]
    fn untagged_parts_are_read_as_text() {
        let content = Content::from_value(json!({
            "text": "ignored",
            "parts": [{"text": "[file:a.png]"}, {"text": "hi"}, 7]
        }));
        assert_eq!(
            content,
            Content::Parts(vec![
                Part::text("[file:a.png]"),
                Part::text("hi"),
                Part::text("7"),
            ])
        );
    }

    #[test]
    fn author_string_mapping() {
        assert_eq!(Author::from("user".to_string()), Author::User);
        assert_eq!(Author::from("tool".to_string()), Author::Tool);
        assert_eq!(
            Author::from("document_agent".to_string()),
            Author::Agent("document_agent".into())
        );
        assert_eq!(String::from(Author::Agent("a".into())), "a");
    }

    #[test]
    fn event_serializes_flat_content() {
        let event = Event::new(Author::User, "hi");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["author"], "user");
        assert_eq!(json["content"], json!({"text": "hi"}));
        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn tool_calls_are_extracted() {
        let event = Event::new(
            Author::Agent("a".into()),
            vec![
                Part::text("Let me check."),
                Part::ToolCall {
                    id: "t1".into(),
                    name: "query_knowledge_base_tool".into(),
                    input: json!({}),
                },
            ],
        );
        let calls = event.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "query_knowledge_base_tool");
        assert_eq!(event.text(), "Let me check.\n[tool_call:query_knowledge_base_tool]");
    }
}
