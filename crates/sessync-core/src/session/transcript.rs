//! Ordered transcript with correlation indices.
//!
//! The transcript keeps explicit position indices for the correlation keys the
//! merger resolves on every event (open assistant message, tool-call ids,
//! reasoning ids), so lookups never scan the message list. The indices always
//! point at the most recent message carrying a given key, which is the same
//! answer a most-recent-first scan would give.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::message::{Message, MessageKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Message>", into = "Vec<Message>")]
pub struct Transcript {
    messages: Vec<Message>,
    open_assistant: Option<usize>,
    tool_calls: HashMap<String, usize>,
    reasoning: HashMap<String, usize>,
    /// Positions of open reasoning blocks, in activation order.
    open_reasoning: Vec<usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a transcript from an externally supplied message list.
    ///
    /// Order indices are reassigned contiguously from 0. If the list carries
    /// more than one open assistant message, all but the last are closed so
    /// that there is a single streaming target.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut transcript = Self::new();
        for message in messages {
            transcript.push(message);
        }
        transcript
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Message> {
        self.messages.get(position)
    }

    /// The order index the next pushed message will receive.
    pub fn next_order_index(&self) -> u64 {
        self.messages.len() as u64
    }

    /// Appends a message, assigning its order index, and returns its position.
    pub fn push(&mut self, mut message: Message) -> usize {
        let position = self.messages.len();
        message.order_index = position as u64;

        match message.kind {
            MessageKind::Assistant if !message.is_complete => {
                if let Some(previous) = self.open_assistant.take() {
                    self.messages[previous].is_complete = true;
                }
                self.open_assistant = Some(position);
            }
            MessageKind::ToolCall => {
                if let Some(id) = &message.tool_call_id {
                    self.tool_calls.insert(id.clone(), position);
                }
            }
            MessageKind::Reasoning => {
                if let Some(id) = &message.reasoning_id {
                    self.reasoning.insert(id.clone(), position);
                }
                if !message.is_complete {
                    self.open_reasoning.push(position);
                }
            }
            _ => {}
        }

        self.messages.push(message);
        position
    }

    /// Mutates the message at `position` in place.
    ///
    /// Kind, correlation ids and order index are restored after `f` runs; only
    /// content, flags, model and timestamp can change. Completion changes are
    /// reflected in the open-message indices. Returns false for an unknown
    /// position.
    pub fn update<F>(&mut self, position: usize, f: F) -> bool
    where
        F: FnOnce(&mut Message),
    {
        let Some(message) = self.messages.get_mut(position) else {
            return false;
        };

        let kind = message.kind;
        let tool_call_id = message.tool_call_id.clone();
        let reasoning_id = message.reasoning_id.clone();
        let order_index = message.order_index;

        f(message);

        message.kind = kind;
        message.tool_call_id = tool_call_id;
        message.reasoning_id = reasoning_id;
        message.order_index = order_index;
        let is_complete = message.is_complete;

        match kind {
            MessageKind::Assistant => {
                if is_complete && self.open_assistant == Some(position) {
                    self.open_assistant = None;
                } else if !is_complete && self.open_assistant != Some(position) {
                    if let Some(previous) = self.open_assistant.replace(position) {
                        self.messages[previous].is_complete = true;
                    }
                }
            }
            MessageKind::Reasoning => {
                self.open_reasoning.retain(|open| *open != position);
                if !is_complete {
                    self.open_reasoning.push(position);
                }
            }
            _ => {}
        }

        true
    }

    /// Position of the open assistant message, if any.
    pub fn open_assistant(&self) -> Option<usize> {
        self.open_assistant
    }

    /// Position of the most recent tool call carrying `tool_call_id`.
    pub fn tool_call_position(&self, tool_call_id: &str) -> Option<usize> {
        self.tool_calls.get(tool_call_id).copied()
    }

    /// Position of the most recent reasoning block carrying `reasoning_id`.
    pub fn reasoning_position(&self, reasoning_id: &str) -> Option<usize> {
        self.reasoning.get(reasoning_id).copied()
    }

    /// Id of the most recently activated reasoning block that is still open.
    pub fn last_open_reasoning_id(&self) -> Option<&str> {
        self.open_reasoning
            .last()
            .and_then(|position| self.messages[*position].reasoning_id.as_deref())
    }

    /// Positions of all open reasoning blocks, in activation order.
    pub fn open_reasoning_positions(&self) -> Vec<usize> {
        self.open_reasoning.clone()
    }

    /// Message-level equality, ignoring index bookkeeping.
    pub fn same_messages(&self, other: &[Message]) -> bool {
        self.messages.as_slice() == other
    }
}

impl From<Vec<Message>> for Transcript {
    fn from(messages: Vec<Message>) -> Self {
        Self::from_messages(messages)
    }
}

impl From<Transcript> for Vec<Message> {
    fn from(transcript: Transcript) -> Self {
        transcript.messages
    }
}
