//! Transcript message types.
//!
//! A message is created by the first event that references a new correlation
//! key and is then mutated in place by later correlated events until it is
//! marked complete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Prompt sent by the local or remote user.
    User,
    /// Streamed assistant output.
    Assistant,
    /// A reasoning block, correlated by `reasoning_id`.
    Reasoning,
    /// A tool invocation, correlated by `tool_call_id`.
    ToolCall,
    /// An error surfaced into the conversation.
    Error,
}

impl MessageKind {
    /// Whether the UI should show this kind collapsed when it is created.
    pub fn collapsed_by_default(self) -> bool {
        matches!(self, Self::ToolCall)
    }
}

/// A single message in a session transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    /// Mutable text; deltas are appended here.
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Correlation key, ToolCall only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Correlation key, Reasoning only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_id: Option<String>,
    #[serde(default)]
    pub is_complete: bool,
    /// Only meaningful for ToolCall messages.
    #[serde(default)]
    pub is_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// UI hint derived from kind and completion.
    #[serde(default)]
    pub collapsed: bool,
    /// Position in the session transcript, assigned once on insertion.
    #[serde(default)]
    pub order_index: u64,
}

impl Message {
    fn base(kind: MessageKind, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            content: content.into(),
            tool_name: None,
            tool_call_id: None,
            reasoning_id: None,
            is_complete: false,
            is_success: false,
            model: None,
            timestamp,
            collapsed: kind.collapsed_by_default(),
            order_index: 0,
        }
    }

    /// A complete user message.
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            is_complete: true,
            ..Self::base(MessageKind::User, content, timestamp)
        }
    }

    /// An open assistant message seeded with the first delta.
    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::base(MessageKind::Assistant, content, timestamp)
    }

    /// An open, collapsed tool call.
    pub fn tool_call(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            tool_call_id: Some(tool_call_id.into()),
            ..Self::base(MessageKind::ToolCall, String::new(), timestamp)
        }
    }

    /// An open, expanded reasoning block.
    pub fn reasoning(reasoning_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            reasoning_id: Some(reasoning_id.into()),
            ..Self::base(MessageKind::Reasoning, String::new(), timestamp)
        }
    }

    /// A complete error message.
    pub fn error(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            is_complete: true,
            ..Self::base(MessageKind::Error, content, timestamp)
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn is_open(&self) -> bool {
        !self.is_complete
    }
}
