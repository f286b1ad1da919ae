use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::MessageId;
use crate::toolcall::ToolInvocation;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Human,
    Ai,
    Tool,
    System,
}

/// Message content is either a plain string or an ordered block sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { mime_type: String, data: String },
}

/// A file attached to a human message, surfaced from side-channel metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One event in the flat conversation stream.
///
/// Ephemeral/optimistic messages may arrive without an id; serde synthesizes
/// one so the rest of the pipeline never deals with id-less messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThreadMessage {
    #[serde(default)]
    pub id: MessageId,
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<FileRef>,
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MessageContent {
    /// Concatenated text of the content, ignoring non-text blocks.
    pub fn text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

impl ThreadMessage {
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Human,
            content: MessageContent::Text(text.into()),
            tool_calls: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Ai,
            content: MessageContent::Text(text.into()),
            tool_calls: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub fn ai_with_tools(text: impl Into<String>, tool_calls: Vec<ToolInvocation>) -> Self {
        Self {
            tool_calls,
            ..Self::ai(text)
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            ..Self::human(text)
        }
    }

    pub fn tool_result(text: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            ..Self::human(text)
        }
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<FileRef>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Decode one raw message value; `None` when the shape is unusable
    /// (unrecognized role, malformed content).
    pub fn from_value(v: &Value) -> Option<ThreadMessage> {
        serde_json::from_value(v.clone()).ok()
    }

    /// Decode a raw message list, dropping entries that fail to decode. One
    /// bad message degrades by omission instead of losing the whole list.
    pub fn decode_all(raw: &Value) -> Vec<ThreadMessage> {
        raw.as_array()
            .map(|items| items.iter().filter_map(Self::from_value).collect())
            .unwrap_or_default()
    }

    pub fn text_content(&self) -> String {
        self.content.text()
    }

    /// Non-empty after trimming; the grouping pass keys off this.
    pub fn has_text(&self) -> bool {
        !self.text_content().trim().is_empty()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
