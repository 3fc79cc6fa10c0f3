use std::collections::HashMap;
use std::sync::Arc;

use sessync_core::session::{Message, Session};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Which session the user is looking at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ActiveSelection {
    pub(crate) name: Option<String>,
    /// Set once any active session was chosen, locally or by adoption.
    pub(crate) ever_chosen: bool,
}

#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    pub(crate) sessions: HashMap<String, Session>,
    pub(crate) active: ActiveSelection,
}

/// Shared keyed collection of mirrored sessions.
///
/// Cloning the registry clones the handle, not the data. Outside this crate
/// the registry is read-only: every accessor returns owned copies, and all
/// mutation goes through the reconciler and the merger.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the named session.
    pub async fn get(&self, name: &str) -> Option<Session> {
        let state = self.state.read().await;
        state.sessions.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.state.read().await.sessions.contains_key(name)
    }

    /// Copies of all sessions, oldest first.
    pub async fn snapshot(&self) -> Vec<Session> {
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        sessions
    }

    pub async fn names(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state.sessions.keys().cloned().collect();
        names.sort();
        names
    }

    /// A copy of the session's messages.
    pub async fn transcript(&self, name: &str) -> Option<Vec<Message>> {
        let state = self.state.read().await;
        state
            .sessions
            .get(name)
            .map(|session| session.transcript.messages().to_vec())
    }

    pub async fn active_session(&self) -> Option<String> {
        self.state.read().await.active.name.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.sessions.is_empty()
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().await
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().await
    }
}
