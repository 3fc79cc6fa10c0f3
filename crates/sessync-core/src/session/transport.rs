//! Transport collaborator interface.
//!
//! The network transport itself is out of scope; the reconciler only needs
//! the queries below.

use async_trait::async_trait;

use super::message::Message;
use super::model::RemoteSessionInfo;
use crate::error::Result;

/// Queries and requests exposed by the event transport.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Current authoritative session roster.
    async fn roster(&self) -> Result<Vec<RemoteSessionInfo>>;

    /// Name of the session the remote side considers active, if any.
    async fn active_session_name(&self) -> Option<String>;

    /// The transport's cached history for a session, if it has fetched one.
    ///
    /// The cache only ever grows.
    async fn cached_history(&self, session_name: &str) -> Option<Vec<Message>>;

    /// Asks the remote side for a session's history.
    ///
    /// The result lands in the cached history; the call itself only reports
    /// whether the request could be issued.
    async fn request_history(&self, session_name: &str) -> Result<()>;
}
