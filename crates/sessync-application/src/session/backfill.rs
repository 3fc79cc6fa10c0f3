use std::collections::HashSet;
use std::sync::Arc;

use sessync_core::session::SessionTransport;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Fire-and-forget history fetches for sessions with an empty transcript.
///
/// A name stays outstanding from the moment its fetch is queued until the
/// reconciler observes a cached history for it (or evicts it), so repeated
/// passes do not request the same history again. A failed fetch is logged
/// and released so that a later pass retries it.
#[derive(Clone)]
pub struct HistoryBackfill {
    transport: Arc<dyn SessionTransport>,
    outstanding: Arc<Mutex<HashSet<String>>>,
    cancel: CancellationToken,
}

impl HistoryBackfill {
    pub fn new(transport: Arc<dyn SessionTransport>, cancel: CancellationToken) -> Self {
        Self {
            transport,
            outstanding: Arc::new(Mutex::new(HashSet::new())),
            cancel,
        }
    }

    /// Queues a fetch unless one is already outstanding. Returns whether a
    /// fetch was queued.
    pub async fn request(&self, session_name: &str) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if !self
            .outstanding
            .lock()
            .await
            .insert(session_name.to_string())
        {
            return false;
        }

        let name = session_name.to_string();
        let transport = self.transport.clone();
        let outstanding = self.outstanding.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("[HistoryBackfill] Fetch for '{}' cancelled", name);
                    outstanding.lock().await.remove(&name);
                }
                result = transport.request_history(&name) => {
                    match result {
                        Ok(()) => {
                            tracing::debug!("[HistoryBackfill] Requested history for '{}'", name);
                        }
                        Err(e) => {
                            tracing::warn!(
                                "[HistoryBackfill] History fetch for '{}' failed, will retry: {}",
                                name,
                                e
                            );
                            outstanding.lock().await.remove(&name);
                        }
                    }
                }
            }
        });

        true
    }

    /// Releases a name once its history arrived or the session went away.
    pub async fn settle(&self, session_name: &str) {
        self.outstanding.lock().await.remove(session_name);
    }

    pub async fn is_outstanding(&self, session_name: &str) -> bool {
        self.outstanding.lock().await.contains(session_name)
    }
}
