//! Canonical message envelope and content blocks.
//!
//! Every transport adapter normalizes to `Message` on the way in and
//! serializes back to its native shape on the way out. The serde form of
//! `Message` is the wire envelope exchanged with HTTP/WS peers.

use crate::address::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope kind. Responses and errors should carry `reply_to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Notification,
    Error,
}

/// Payload type of one content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Text,
    Json,
    Markdown,
    Html,
    BinaryFile,
    ToolCall,
    ToolResult,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Json => "json",
            ContentType::Markdown => "markdown",
            ContentType::Html => "html",
            ContentType::BinaryFile => "binary-file",
            ContentType::ToolCall => "tool-call",
            ContentType::ToolResult => "tool-result",
        }
    }
}

/// One unit of payload. Immutable once attached to a sent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    /// String for text/markdown/html; arbitrary JSON for json/tool blocks;
    /// location/size metadata object for binary-file.
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Content {
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            content_type: ContentType::Text,
            data: Value::String(data.into()),
            mime_type: None,
            metadata: Map::new(),
        }
    }

    pub fn markdown(data: impl Into<String>) -> Self {
        Self {
            content_type: ContentType::Markdown,
            data: Value::String(data.into()),
            mime_type: Some("text/markdown".to_string()),
            metadata: Map::new(),
        }
    }

    pub fn json(data: Value) -> Self {
        Self {
            content_type: ContentType::Json,
            data,
            mime_type: Some("application/json".to_string()),
            metadata: Map::new(),
        }
    }

    /// Binary-file block: the data carries a location reference and size,
    /// not the bytes themselves.
    pub fn binary_file(location: impl Into<String>, size: u64, mime_type: Option<String>) -> Self {
        Self {
            content_type: ContentType::BinaryFile,
            data: serde_json::json!({ "location": location.into(), "size": size }),
            mime_type,
            metadata: Map::new(),
        }
    }

    /// Plain-text rendering of this block, used when down-converting rich
    /// content for limited channels.
    pub fn as_text(&self) -> Option<&str> {
        self.data.as_str()
    }
}

/// The canonical, transport-independent envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Ordered blocks; multiple blocks concatenate. May be empty.
    #[serde(default)]
    pub content: Vec<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Message {
    /// New request with a single text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            id: format!("msg-{}", uuid::Uuid::new_v4()),
            kind: MessageKind::Request,
            timestamp: Utc::now(),
            source: None,
            destination: None,
            reply_to: None,
            content: vec![Content::text(text)],
            session_id: None,
            conversation_id: None,
            metadata: Map::new(),
        }
    }

    /// New notification with no content (pure control message).
    pub fn notification() -> Self {
        Self {
            id: format!("msg-{}", uuid::Uuid::new_v4()),
            kind: MessageKind::Notification,
            timestamp: Utc::now(),
            source: None,
            destination: None,
            reply_to: None,
            content: Vec::new(),
            session_id: None,
            conversation_id: None,
            metadata: Map::new(),
        }
    }

    /// Response to `request`: sets reply_to, session, conversation, and
    /// swaps source/destination.
    pub fn response_to(request: &Message, content: Vec<Content>) -> Self {
        Self {
            id: format!("msg-{}", uuid::Uuid::new_v4()),
            kind: MessageKind::Response,
            timestamp: Utc::now(),
            source: request.destination.clone(),
            destination: request.source.clone(),
            reply_to: Some(request.id.clone()),
            content,
            session_id: request.session_id.clone(),
            conversation_id: request.conversation_id.clone(),
            metadata: Map::new(),
        }
    }

    /// Error envelope answering `request`, with a structured `{code, message}`
    /// JSON block followed by a human-readable text block.
    pub fn error_to(request: &Message, code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut m = Self::response_to(
            request,
            vec![
                Content::json(serde_json::json!({ "code": code, "message": message.clone() })),
                Content::text(message),
            ],
        );
        m.kind = MessageKind::Error;
        m
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_source(mut self, source: Address) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Data of the first text block, or "" when no text block exists.
    /// Used by the router for classification; never fails.
    pub fn extract_text(&self) -> &str {
        self.content
            .iter()
            .find(|c| c.content_type == ContentType::Text)
            .and_then(|c| c.as_text())
            .unwrap_or("")
    }

    /// Serialize to the wire envelope (JSON).
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from the wire envelope (JSON).
    pub fn from_wire(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    #[test]
    fn wire_round_trip() {
        let mut m = Message::text("hello");
        m.source = Some(Address::new("peer").with_channel("ws"));
        m.destination = Some(Address::new("ponte"));
        m.session_id = Some("sess-1".to_string());
        m.content.push(Content::json(serde_json::json!({"k": 1})));
        m.metadata
            .insert("origin".to_string(), Value::String("test".to_string()));
        let wire = m.to_wire().unwrap();
        assert_eq!(Message::from_wire(&wire).unwrap(), m);
    }

    #[test]
    fn wire_round_trip_empty_content_null_addresses() {
        let m = Message::notification();
        assert!(m.content.is_empty());
        let wire = m.to_wire().unwrap();
        let back = Message::from_wire(&wire).unwrap();
        assert_eq!(back, m);
        assert!(back.source.is_none() && back.destination.is_none());
    }

    #[test]
    fn extract_text_missing_block_is_empty() {
        let m = Message::notification();
        assert_eq!(m.extract_text(), "");
        let mut m = Message::notification();
        m.content.push(Content::json(serde_json::json!([1, 2])));
        assert_eq!(m.extract_text(), "");
    }

    #[test]
    fn error_to_sets_reply_and_code() {
        let req = Message::text("/nope").with_session("sess-9");
        let err = Message::error_to(&req, "unknown_command", "no such command");
        assert_eq!(err.kind, MessageKind::Error);
        assert_eq!(err.reply_to.as_deref(), Some(req.id.as_str()));
        assert_eq!(err.session_id.as_deref(), Some("sess-9"));
        assert_eq!(
            err.content[0].data.get("code").and_then(|v| v.as_str()),
            Some("unknown_command")
        );
        assert_eq!(err.extract_text(), "no such command");
    }

    #[test]
    fn kind_serializes_as_type() {
        let wire = Message::text("x").to_wire().unwrap();
        let v: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(v.get("type").and_then(|t| t.as_str()), Some("request"));
        assert_eq!(
            v["content"][0].get("type").and_then(|t| t.as_str()),
            Some("text")
        );
    }
}
