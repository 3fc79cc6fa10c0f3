use serde::{Deserialize, Serialize};

/// Events delivered by the transport, in its fixed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TransportEvent {
    /// Connection or remote state changed; the roster should be re-read.
    StateChanged,
    ContentDelta {
        session: String,
        text: String,
    },
    ToolStarted {
        session: String,
        name: String,
        id: String,
    },
    ToolCompleted {
        session: String,
        id: String,
        #[serde(default)]
        result: String,
        #[serde(default)]
        success: bool,
    },
    ReasoningDelta {
        session: String,
        /// May be empty: continue the current open reasoning block.
        #[serde(default)]
        id: String,
        text: String,
    },
    ReasoningComplete {
        session: String,
        /// Empty completes every open reasoning block.
        #[serde(default)]
        id: String,
    },
    TurnStart {
        session: String,
    },
    TurnEnd {
        session: String,
    },
    SessionListChanged,
}

/// A transcript-level event addressed to one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    ContentDelta { text: String },
    ToolStarted { name: String, id: String },
    ToolCompleted { id: String, result: String, success: bool },
    ReasoningDelta { id: String, text: String },
    ReasoningComplete { id: String },
    TurnStart,
    TurnEnd,
}

/// Where a transport event has to be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTarget {
    /// The roster must be reconciled.
    Roster,
    /// A single session transcript must be merged.
    Session { name: String, event: SessionEvent },
}

impl TransportEvent {
    /// The session this event addresses, if any.
    pub fn session_name(&self) -> Option<&str> {
        match self {
            Self::StateChanged | Self::SessionListChanged => None,
            Self::ContentDelta { session, .. }
            | Self::ToolStarted { session, .. }
            | Self::ToolCompleted { session, .. }
            | Self::ReasoningDelta { session, .. }
            | Self::ReasoningComplete { session, .. }
            | Self::TurnStart { session }
            | Self::TurnEnd { session } => Some(session.as_str()),
        }
    }

    pub fn into_target(self) -> EventTarget {
        let (name, event) = match self {
            Self::StateChanged | Self::SessionListChanged => return EventTarget::Roster,
            Self::ContentDelta { session, text } => (session, SessionEvent::ContentDelta { text }),
            Self::ToolStarted { session, name, id } => {
                (session, SessionEvent::ToolStarted { name, id })
            }
            Self::ToolCompleted {
                session,
                id,
                result,
                success,
            } => (
                session,
                SessionEvent::ToolCompleted {
                    id,
                    result,
                    success,
                },
            ),
            Self::ReasoningDelta { session, id, text } => {
                (session, SessionEvent::ReasoningDelta { id, text })
            }
            Self::ReasoningComplete { session, id } => {
                (session, SessionEvent::ReasoningComplete { id })
            }
            Self::TurnStart { session } => (session, SessionEvent::TurnStart),
            Self::TurnEnd { session } => (session, SessionEvent::TurnEnd),
        };
        EventTarget::Session { name, event }
    }
}
