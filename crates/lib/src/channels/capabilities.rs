//! Channel capability descriptors and content negotiation.

use crate::message::{Content, ContentType, Message};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a channel can carry. Read-only configuration per adapter instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelCapabilities {
    pub supported_content_types: Vec<ContentType>,
    pub max_message_size: usize,
    pub max_attachment_size: usize,
    pub supports_streaming: bool,
    pub supports_attachments: bool,
    pub supports_images: bool,
    pub supports_folders: bool,
    pub supports_multipart: bool,
    pub supports_markdown: bool,
    pub supports_html: bool,
    pub max_concurrent_connections: usize,
    pub rate_limit_per_minute: usize,
}

impl ChannelCapabilities {
    /// Local socket clients get the full content model.
    pub fn local_socket() -> Self {
        Self {
            supported_content_types: vec![
                ContentType::Text,
                ContentType::Json,
                ContentType::Markdown,
                ContentType::Html,
                ContentType::BinaryFile,
                ContentType::ToolCall,
                ContentType::ToolResult,
            ],
            max_message_size: 8 * 1024 * 1024,
            max_attachment_size: 64 * 1024 * 1024,
            supports_streaming: false,
            supports_attachments: true,
            supports_images: true,
            supports_folders: true,
            supports_multipart: true,
            supports_markdown: true,
            supports_html: true,
            max_concurrent_connections: 32,
            rate_limit_per_minute: 0,
        }
    }

    /// HTTP/WS peers exchange full envelopes.
    pub fn peer() -> Self {
        Self {
            supported_content_types: vec![
                ContentType::Text,
                ContentType::Json,
                ContentType::Markdown,
                ContentType::Html,
                ContentType::BinaryFile,
                ContentType::ToolCall,
                ContentType::ToolResult,
            ],
            max_message_size: 16 * 1024 * 1024,
            max_attachment_size: 128 * 1024 * 1024,
            supports_streaming: true,
            supports_attachments: true,
            supports_images: true,
            supports_folders: false,
            supports_multipart: true,
            supports_markdown: true,
            supports_html: true,
            max_concurrent_connections: 64,
            rate_limit_per_minute: 0,
        }
    }

    /// Chat bridges are the limited case: text only.
    pub fn bridge() -> Self {
        Self {
            supported_content_types: vec![ContentType::Text, ContentType::Markdown],
            max_message_size: 64 * 1024,
            max_attachment_size: 0,
            supports_streaming: false,
            supports_attachments: false,
            supports_images: false,
            supports_folders: false,
            supports_multipart: false,
            supports_markdown: false,
            supports_html: false,
            max_concurrent_connections: 1,
            rate_limit_per_minute: 30,
        }
    }

    fn supports(&self, t: ContentType) -> bool {
        self.supported_content_types.contains(&t)
    }
}

/// Adapt an outgoing message to a channel's capabilities.
///
/// Unsupported blocks are dropped and their types recorded under
/// `metadata["dropped_content"]`; markdown/html down-convert to text when
/// the channel carries text but not the rich form. Text blocks always
/// survive.
pub fn adapt_for_channel(message: &Message, caps: &ChannelCapabilities) -> Message {
    let mut adapted = message.clone();
    let mut kept: Vec<Content> = Vec::with_capacity(message.content.len());
    let mut dropped: Vec<Value> = Vec::new();

    for block in &message.content {
        match block.content_type {
            ContentType::Text => kept.push(block.clone()),
            ContentType::Markdown if !caps.supports_markdown || !caps.supports(ContentType::Markdown) => {
                downgrade_or_drop(block, caps, &mut kept, &mut dropped);
            }
            ContentType::Html if !caps.supports_html || !caps.supports(ContentType::Html) => {
                downgrade_or_drop(block, caps, &mut kept, &mut dropped);
            }
            ContentType::BinaryFile if !caps.supports_attachments => {
                dropped.push(Value::String(block.content_type.as_str().to_string()));
            }
            t if !caps.supports(t) => {
                dropped.push(Value::String(t.as_str().to_string()));
            }
            _ => kept.push(block.clone()),
        }
    }

    adapted.content = kept;
    if !dropped.is_empty() {
        adapted
            .metadata
            .insert("dropped_content".to_string(), Value::Array(dropped));
    }
    adapted
}

/// Rich text becomes a plain text block when the channel carries text;
/// otherwise the block is dropped and recorded.
fn downgrade_or_drop(
    block: &Content,
    caps: &ChannelCapabilities,
    kept: &mut Vec<Content>,
    dropped: &mut Vec<Value>,
) {
    match block.as_text() {
        Some(text) if caps.supports(ContentType::Text) => kept.push(Content::text(text)),
        _ => dropped.push(Value::String(block.content_type.as_str().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn binary_dropped_for_no_attachment_channel() {
        let mut msg = Message::text("here is your file");
        msg.content
            .push(Content::binary_file("blob://abc", 1024, None));
        let out = adapt_for_channel(&msg, &ChannelCapabilities::bridge());
        assert_eq!(out.content.len(), 1);
        assert_eq!(out.extract_text(), "here is your file");
        let dropped = out.metadata.get("dropped_content").unwrap();
        assert_eq!(dropped[0], Value::String("binary-file".to_string()));
    }

    #[test]
    fn markdown_downgrades_to_text_on_bridge() {
        let mut msg = Message::notification();
        msg.content.push(Content::markdown("**bold**"));
        let out = adapt_for_channel(&msg, &ChannelCapabilities::bridge());
        assert_eq!(out.content.len(), 1);
        assert_eq!(out.content[0].content_type, ContentType::Text);
        assert_eq!(out.extract_text(), "**bold**");
        assert!(out.metadata.get("dropped_content").is_none());
    }

    #[test]
    fn full_capability_channel_keeps_everything() {
        let mut msg = Message::text("t");
        msg.content.push(Content::markdown("# h"));
        msg.content.push(Content::binary_file("blob://x", 9, None));
        let out = adapt_for_channel(&msg, &ChannelCapabilities::local_socket());
        assert_eq!(out.content, msg.content);
        assert!(out.metadata.get("dropped_content").is_none());
    }
}
