use std::sync::Arc;

use sessync_core::error::Result;
use sessync_core::session::{HistoryRepository, MessageKind, StoredMessage};

use super::merger::{AppliedChange, TouchedMessage};

/// Persists live transcript changes into the history store.
///
/// Every message is appended when it is created, so stored order indices
/// follow transcript order. Later content is written at lifecycle
/// boundaries rather than per delta:
///
/// | kind | appended | updated |
/// |---|---|---|
/// | User, Error | created | never |
/// | ToolCall | created | on completion |
/// | Reasoning | created | on every completion |
/// | Assistant | created (first delta) | closed (turn end) |
///
/// Storage failures are logged and swallowed.
#[derive(Clone)]
pub struct TranscriptRecorder {
    history: Arc<dyn HistoryRepository>,
}

impl TranscriptRecorder {
    pub fn new(history: Arc<dyn HistoryRepository>) -> Self {
        Self { history }
    }

    pub async fn record(&self, change: &AppliedChange) {
        for touched in &change.touched {
            self.record_message(&change.session, touched).await;
        }
    }

    async fn append(&self, session: &str, touched: &TouchedMessage) -> Result<bool> {
        self.history
            .append(session, StoredMessage::from_message(&touched.message))
            .await
            .map(|_| true)
    }

    async fn record_message(&self, session: &str, touched: &TouchedMessage) {
        let message = &touched.message;
        let result = match message.kind {
            _ if touched.created => self.append(session, touched).await,
            MessageKind::Assistant if message.is_complete => {
                self.history
                    .complete_assistant(session, &message.content)
                    .await
            }
            MessageKind::ToolCall if message.is_complete => match &message.tool_call_id {
                Some(id) => {
                    self.history
                        .update_tool_result(session, id, &message.content, message.is_success)
                        .await
                }
                None => Ok(false),
            },
            MessageKind::Reasoning if message.is_complete => match &message.reasoning_id {
                Some(id) => {
                    self.history
                        .update_reasoning(session, id, &message.content, true)
                        .await
                }
                None => Ok(false),
            },
            _ => return,
        };

        match result {
            Ok(true) => {}
            Ok(false) => tracing::debug!(
                "[TranscriptRecorder] No stored {:?} record to update in '{}'",
                message.kind,
                session
            ),
            Err(e) => tracing::warn!(
                "[TranscriptRecorder] Failed to persist {:?} message for '{}': {}",
                message.kind,
                session,
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MessageMerger, SessionRegistry};
    use chrono::Utc;
    use sessync_core::session::{RemoteSessionInfo, Session, SessionEvent};
    use sessync_infrastructure::MemoryHistoryRepository;

    async fn fixture() -> (
        MessageMerger,
        TranscriptRecorder,
        Arc<MemoryHistoryRepository>,
        SessionRegistry,
    ) {
        let registry = SessionRegistry::new();
        let info = RemoteSessionInfo {
            name: "s".to_string(),
            model: "m".to_string(),
            created_at: Utc::now(),
            session_id: "sid".to_string(),
            working_directory: "/w".to_string(),
            is_processing: false,
            message_count: 0,
        };
        registry
            .write()
            .await
            .sessions
            .insert("s".to_string(), Session::from_remote(&info, Utc::now()));

        let store = Arc::new(MemoryHistoryRepository::new());
        let recorder = TranscriptRecorder::new(store.clone());
        (MessageMerger::new(registry.clone()), recorder, store, registry)
    }

    async fn apply(merger: &MessageMerger, recorder: &TranscriptRecorder, event: SessionEvent) {
        if let Some(change) = merger.apply("s", event).await.change() {
            recorder.record(change).await;
        }
    }

    #[tokio::test]
    async fn test_assistant_is_reserved_then_closed() {
        let (merger, recorder, store, _) = fixture().await;

        apply(&merger, &recorder, SessionEvent::TurnStart).await;
        for text in ["Hel", "lo"] {
            apply(
                &merger,
                &recorder,
                SessionEvent::ContentDelta {
                    text: text.to_string(),
                },
            )
            .await;
        }
        let stored = store.get_all("s").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "Hel");
        assert!(!stored[0].is_complete);

        apply(&merger, &recorder, SessionEvent::TurnEnd).await;
        let stored = store.get_all("s").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "Hello");
        assert!(stored[0].is_complete);
    }

    #[tokio::test]
    async fn test_stored_order_follows_transcript_order() {
        let (merger, recorder, store, registry) = fixture().await;

        let events = vec![
            SessionEvent::ContentDelta {
                text: "Let me check".to_string(),
            },
            SessionEvent::ToolStarted {
                name: "bash".to_string(),
                id: "t1".to_string(),
            },
            SessionEvent::ToolCompleted {
                id: "t1".to_string(),
                result: "ok".to_string(),
                success: true,
            },
            SessionEvent::TurnEnd,
        ];
        for event in events {
            apply(&merger, &recorder, event).await;
        }

        let live: Vec<MessageKind> = registry
            .transcript("s")
            .await
            .unwrap()
            .iter()
            .map(|m| m.kind)
            .collect();
        let stored = store.get_all("s").await.unwrap();
        let stored_kinds: Vec<MessageKind> = stored.iter().map(|r| r.kind).collect();
        assert_eq!(live, vec![MessageKind::Assistant, MessageKind::ToolCall]);
        assert_eq!(stored_kinds, live);
        assert_eq!(stored[0].content, "Let me check");
        assert!(stored.iter().all(|r| r.is_complete));
    }

    #[tokio::test]
    async fn test_tool_call_is_appended_then_completed() {
        let (merger, recorder, store, _) = fixture().await;

        apply(
            &merger,
            &recorder,
            SessionEvent::ToolStarted {
                name: "read".to_string(),
                id: "t1".to_string(),
            },
        )
        .await;
        let stored = store.get_all("s").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].is_complete);

        apply(
            &merger,
            &recorder,
            SessionEvent::ToolCompleted {
                id: "t1".to_string(),
                result: "42 lines".to_string(),
                success: true,
            },
        )
        .await;
        let stored = store.get_all("s").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "42 lines");
        assert!(stored[0].is_complete && stored[0].is_success);
    }

    #[tokio::test]
    async fn test_reasoning_is_updated_on_completion() {
        let (merger, recorder, store, _) = fixture().await;

        for text in ["plan", " more"] {
            apply(
                &merger,
                &recorder,
                SessionEvent::ReasoningDelta {
                    id: "r".to_string(),
                    text: text.to_string(),
                },
            )
            .await;
        }
        apply(
            &merger,
            &recorder,
            SessionEvent::ReasoningComplete {
                id: "r".to_string(),
            },
        )
        .await;

        let stored = store.get_all("s").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "plan more");
        assert!(stored[0].is_complete);
    }

    #[tokio::test]
    async fn test_local_user_message_is_appended() {
        let (merger, recorder, store, _) = fixture().await;

        let outcome = merger.submit_user_message("s", "do it").await;
        recorder.record(outcome.change().unwrap()).await;

        let stored = store.get_all("s").await.unwrap();
        assert_eq!(stored[0].kind, MessageKind::User);
        assert_eq!(stored[0].content, "do it");
    }
}
