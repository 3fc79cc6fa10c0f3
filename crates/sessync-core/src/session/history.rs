//! Persistent transcript history.
//!
//! `StoredMessage` is the persisted record shape (one record per message).
//! `HistoryLog` holds the record-level operations shared by every
//! `HistoryRepository` implementation, so file-backed and in-memory stores
//! assign order indices and resolve pages identically.

use std::ops::Range;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::{Message, MessageKind};
use crate::error::Result;

/// One persisted transcript record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Record identity, assigned by the store
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub session_key: String,
    /// Assigned by the store: 1 + current max, 0 for the first record
    #[serde(default)]
    pub order_index: u64,
    pub kind: MessageKind,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub is_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Cached rendered markup, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_markup: Option<String>,
    /// Cached binary payload, passed through untouched (base64 on disk)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "payload_encoding"
    )]
    pub encoded_payload: Option<Vec<u8>>,
}

impl StoredMessage {
    /// Builds a record from a transcript message. Identity, key and order
    /// index are left for the store to assign.
    pub fn from_message(message: &Message) -> Self {
        Self {
            id: String::new(),
            session_key: String::new(),
            order_index: message.order_index,
            kind: message.kind,
            content: message.content.clone(),
            tool_name: message.tool_name.clone(),
            tool_call_id: message.tool_call_id.clone(),
            is_complete: message.is_complete,
            is_success: message.is_success,
            reasoning_id: message.reasoning_id.clone(),
            model: message.model.clone(),
            timestamp: message.timestamp,
            rendered_markup: None,
            encoded_payload: None,
        }
    }

    /// Converts the record back into a transcript message.
    ///
    /// `collapsed` is derived: tool calls are always collapsed, reasoning
    /// blocks once complete.
    pub fn to_message(&self) -> Message {
        let collapsed = match self.kind {
            MessageKind::ToolCall => true,
            MessageKind::Reasoning => self.is_complete,
            _ => false,
        };
        Message {
            kind: self.kind,
            content: self.content.clone(),
            tool_name: self.tool_name.clone(),
            tool_call_id: self.tool_call_id.clone(),
            reasoning_id: self.reasoning_id.clone(),
            is_complete: self.is_complete,
            is_success: self.is_success,
            model: self.model.clone(),
            timestamp: self.timestamp,
            collapsed,
            order_index: self.order_index,
        }
    }
}

mod payload_encoding {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Option::<String>::deserialize(deserializer)?;
        encoded
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Resolves a tail-relative page into a chronological index range.
///
/// `offset` counts back from the newest record. Returns `None` when the
/// window is empty.
pub fn tail_window(total: usize, limit: usize, offset: usize) -> Option<Range<usize>> {
    let available = total.checked_sub(offset)?;
    let take = limit.min(available);
    if take == 0 {
        return None;
    }
    let skip = available.saturating_sub(limit);
    Some(skip..skip + take)
}

/// The ordered record log of a single session.
///
/// Deserialized logs are sorted by order index, whatever order the records
/// had on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawHistoryLog")]
pub struct HistoryLog {
    records: Vec<StoredMessage>,
}

#[derive(Deserialize)]
struct RawHistoryLog {
    #[serde(default)]
    records: Vec<StoredMessage>,
}

impl From<RawHistoryLog> for HistoryLog {
    fn from(raw: RawHistoryLog) -> Self {
        Self::from_records(raw.records)
    }
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps loaded records, sorted by order index.
    pub fn from_records(mut records: Vec<StoredMessage>) -> Self {
        records.sort_by_key(|record| record.order_index);
        Self { records }
    }

    pub fn records(&self) -> &[StoredMessage] {
        &self.records
    }

    pub fn into_records(self) -> Vec<StoredMessage> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn next_order_index(&self) -> u64 {
        self.records
            .iter()
            .map(|record| record.order_index)
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Appends a record with a fresh identity and the next order index.
    pub fn append(&mut self, session_key: &str, mut record: StoredMessage) -> String {
        let id = Uuid::new_v4().to_string();
        record.id = id.clone();
        record.session_key = session_key.to_string();
        record.order_index = self.next_order_index();
        self.records.push(record);
        id
    }

    pub fn page(&self, limit: usize, offset: usize) -> Vec<StoredMessage> {
        tail_window(self.records.len(), limit, offset)
            .map(|range| self.records[range].to_vec())
            .unwrap_or_default()
    }

    /// Completes the most recent tool-call record carrying `tool_call_id`.
    pub fn update_tool_result(&mut self, tool_call_id: &str, content: &str, success: bool) -> bool {
        let Some(record) = self.records.iter_mut().rev().find(|record| {
            record.kind == MessageKind::ToolCall
                && record.tool_call_id.as_deref() == Some(tool_call_id)
        }) else {
            return false;
        };
        record.content = content.to_string();
        record.is_success = success;
        record.is_complete = true;
        true
    }

    /// Updates the most recent reasoning record carrying `reasoning_id`.
    pub fn update_reasoning(&mut self, reasoning_id: &str, content: &str, complete: bool) -> bool {
        let Some(record) = self.records.iter_mut().rev().find(|record| {
            record.kind == MessageKind::Reasoning
                && record.reasoning_id.as_deref() == Some(reasoning_id)
        }) else {
            return false;
        };
        record.content = content.to_string();
        record.is_complete = complete;
        true
    }

    /// Closes the most recent open assistant record with its final content.
    pub fn complete_assistant(&mut self, content: &str) -> bool {
        let Some(record) = self
            .records
            .iter_mut()
            .rev()
            .find(|record| record.kind == MessageKind::Assistant && !record.is_complete)
        else {
            return false;
        };
        record.content = content.to_string();
        record.is_complete = true;
        true
    }

    /// Drops every record and rewrites `records` with sequential indices.
    pub fn replace_all(&mut self, session_key: &str, records: Vec<StoredMessage>) {
        self.records.clear();
        for record in records {
            self.append(session_key, record);
        }
    }
}

/// Durable, per-session ordered message log.
///
/// Every operation is scoped to a session key. Implementations must
/// serialize writers of the same key so that no two records ever share an
/// order index; writers of different keys may run in parallel.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Appends a record and returns its assigned identity.
    async fn append(&self, session_key: &str, message: StoredMessage) -> Result<String>;

    /// Returns a tail-relative page in chronological order.
    async fn get_page(
        &self,
        session_key: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredMessage>>;

    /// Returns the full history in ascending order.
    async fn get_all(&self, session_key: &str) -> Result<Vec<StoredMessage>>;

    /// Completes the matching tool-call record. Returns whether one matched.
    async fn update_tool_result(
        &self,
        session_key: &str,
        tool_call_id: &str,
        content: &str,
        success: bool,
    ) -> Result<bool>;

    /// Updates the matching reasoning record. Returns whether one matched.
    async fn update_reasoning(
        &self,
        session_key: &str,
        reasoning_id: &str,
        content: &str,
        complete: bool,
    ) -> Result<bool>;

    /// Closes the most recent open assistant record with its final content.
    /// Returns whether one matched.
    async fn complete_assistant(&self, session_key: &str, content: &str) -> Result<bool>;

    /// Atomically replaces the whole history of a session.
    async fn bulk_replace(&self, session_key: &str, messages: Vec<StoredMessage>) -> Result<()>;

    /// Deletes every record of a session.
    async fn clear(&self, session_key: &str) -> Result<()>;

    async fn count(&self, session_key: &str) -> Result<usize>;

    async fn has_any(&self, session_key: &str) -> Result<bool> {
        Ok(self.count(session_key).await? > 0)
    }
}
