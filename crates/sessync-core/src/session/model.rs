//! Session domain model.
//!
//! A `Session` is the local mirror of one remote agent conversation. It is
//! keyed by `name`, which the creator chooses and which never changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::transcript::Transcript;

/// One entry of the authoritative remote session roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSessionInfo {
    pub name: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    /// Opaque backend identifier
    pub session_id: String,
    pub working_directory: String,
    #[serde(default)]
    pub is_processing: bool,
    #[serde(default)]
    pub message_count: u64,
}

/// Represents one mirrored session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique, stable key chosen by the creator
    pub name: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub session_id: String,
    pub working_directory: String,
    pub is_processing: bool,
    /// Message count as reported by the authority
    pub message_count: u64,
    pub last_updated_at: DateTime<Utc>,
    /// True while locally created and not yet confirmed by a roster snapshot
    pub pending: bool,
    #[serde(default)]
    pub transcript: Transcript,
}

impl Session {
    /// Creates a confirmed session from a roster entry, with an empty transcript.
    pub fn from_remote(info: &RemoteSessionInfo, now: DateTime<Utc>) -> Self {
        Self {
            name: info.name.clone(),
            model: info.model.clone(),
            created_at: info.created_at,
            session_id: info.session_id.clone(),
            working_directory: info.working_directory.clone(),
            is_processing: info.is_processing,
            message_count: info.message_count,
            last_updated_at: now,
            pending: false,
            transcript: Transcript::new(),
        }
    }

    /// Creates an optimistic session that awaits roster confirmation.
    pub fn optimistic(info: &RemoteSessionInfo, now: DateTime<Utc>) -> Self {
        Self {
            pending: true,
            ..Self::from_remote(info, now)
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated_at = now;
    }
}
