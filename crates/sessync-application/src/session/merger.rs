//! Streaming merge of per-session events into transcripts.
//!
//! Every event has a defined fallback; the merger never fails. Events for
//! sessions that are not in the registry, duplicate starts and completions
//! for unknown ids are absorbed and reported as [`ApplyOutcome::Ignored`].

use chrono::{DateTime, Utc};
use sessync_core::session::{Message, SessionEvent, Session};
use uuid::Uuid;

use super::registry::SessionRegistry;

/// A message created or mutated by one apply, copied after the change.
#[derive(Debug, Clone, PartialEq)]
pub struct TouchedMessage {
    pub position: usize,
    /// True when the apply created the message.
    pub created: bool,
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChange {
    pub session: String,
    pub touched: Vec<TouchedMessage>,
    /// New processing flag, when the apply flipped it.
    pub processing: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Ignored,
    Changed(AppliedChange),
}

impl ApplyOutcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }

    pub fn change(&self) -> Option<&AppliedChange> {
        match self {
            Self::Changed(change) => Some(change),
            Self::Ignored => None,
        }
    }
}

#[derive(Default)]
struct ChangeSet {
    touched: Vec<(usize, bool)>,
    processing: Option<bool>,
}

impl ChangeSet {
    fn created(&mut self, position: usize) {
        self.touched.push((position, true));
    }

    fn updated(&mut self, position: usize) {
        if !self.touched.iter().any(|(p, _)| *p == position) {
            self.touched.push((position, false));
        }
    }

    fn is_empty(&self) -> bool {
        self.touched.is_empty() && self.processing.is_none()
    }
}

/// Applies transcript events to sessions held in a [`SessionRegistry`].
#[derive(Clone)]
pub struct MessageMerger {
    registry: SessionRegistry,
}

impl MessageMerger {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    /// Applies one event to the named session.
    pub async fn apply(&self, session_name: &str, event: SessionEvent) -> ApplyOutcome {
        tracing::debug!("[MessageMerger] {} <- {:?}", session_name, event);
        self.with_session(session_name, |session, now| merge(session, event, now))
            .await
    }

    /// Appends a complete user message, as typed locally.
    pub async fn submit_user_message(&self, session_name: &str, text: &str) -> ApplyOutcome {
        self.with_session(session_name, |session, now| {
            let mut changes = ChangeSet::default();
            let position = session.transcript.push(Message::user(text, now));
            changes.created(position);
            changes
        })
        .await
    }

    /// Appends a complete error message to the transcript.
    pub async fn record_error(&self, session_name: &str, text: &str) -> ApplyOutcome {
        self.with_session(session_name, |session, now| {
            let mut changes = ChangeSet::default();
            let message = Message::error(text, now).with_model(model_of(session));
            let position = session.transcript.push(message);
            changes.created(position);
            changes
        })
        .await
    }

    async fn with_session<F>(&self, session_name: &str, f: F) -> ApplyOutcome
    where
        F: FnOnce(&mut Session, DateTime<Utc>) -> ChangeSet,
    {
        let mut state = self.registry.write().await;
        let Some(session) = state.sessions.get_mut(session_name) else {
            tracing::debug!(
                "[MessageMerger] Ignoring event for unknown session '{}'",
                session_name
            );
            return ApplyOutcome::Ignored;
        };

        let now = Utc::now();
        let changes = f(session, now);
        if changes.is_empty() {
            return ApplyOutcome::Ignored;
        }
        session.touch(now);

        let touched = changes
            .touched
            .into_iter()
            .filter_map(|(position, created)| {
                session
                    .transcript
                    .get(position)
                    .map(|message| TouchedMessage {
                        position,
                        created,
                        message: message.clone(),
                    })
            })
            .collect();

        ApplyOutcome::Changed(AppliedChange {
            session: session_name.to_string(),
            touched,
            processing: changes.processing,
        })
    }
}

fn model_of(session: &Session) -> Option<String> {
    (!session.model.is_empty()).then(|| session.model.clone())
}

fn merge(session: &mut Session, event: SessionEvent, now: DateTime<Utc>) -> ChangeSet {
    let mut changes = ChangeSet::default();
    match event {
        SessionEvent::ContentDelta { text } => content_delta(session, &text, now, &mut changes),
        SessionEvent::ToolStarted { name, id } => tool_started(session, name, id, now, &mut changes),
        SessionEvent::ToolCompleted {
            id,
            result,
            success,
        } => tool_completed(session, &id, result, success, &mut changes),
        SessionEvent::ReasoningDelta { id, text } => {
            reasoning_delta(session, id, &text, now, &mut changes)
        }
        SessionEvent::ReasoningComplete { id } => reasoning_complete(session, &id, &mut changes),
        SessionEvent::TurnStart => {
            if !session.is_processing {
                session.is_processing = true;
                changes.processing = Some(true);
            }
        }
        SessionEvent::TurnEnd => {
            if session.is_processing {
                session.is_processing = false;
                changes.processing = Some(false);
            }
            if let Some(position) = session.transcript.open_assistant() {
                session
                    .transcript
                    .update(position, |message| message.is_complete = true);
                changes.updated(position);
            }
        }
    }
    changes
}

fn content_delta(session: &mut Session, text: &str, now: DateTime<Utc>, changes: &mut ChangeSet) {
    if text.is_empty() {
        return;
    }
    match session.transcript.open_assistant() {
        Some(position) => {
            session
                .transcript
                .update(position, |message| message.content.push_str(text));
            changes.updated(position);
        }
        None => {
            let message = Message::assistant(text, now).with_model(model_of(session));
            let position = session.transcript.push(message);
            changes.created(position);
        }
    }
}

fn tool_started(
    session: &mut Session,
    name: String,
    id: String,
    now: DateTime<Utc>,
    changes: &mut ChangeSet,
) {
    let still_open = session
        .transcript
        .tool_call_position(&id)
        .and_then(|position| session.transcript.get(position))
        .is_some_and(Message::is_open);
    if still_open {
        tracing::debug!(
            "[MessageMerger] Duplicate start for open tool call '{}' in '{}'",
            id,
            session.name
        );
        return;
    }

    let message = Message::tool_call(name, id, now).with_model(model_of(session));
    let position = session.transcript.push(message);
    changes.created(position);
}

fn tool_completed(
    session: &mut Session,
    id: &str,
    result: String,
    success: bool,
    changes: &mut ChangeSet,
) {
    let open_position = session
        .transcript
        .tool_call_position(id)
        .filter(|position| {
            session
                .transcript
                .get(*position)
                .is_some_and(Message::is_open)
        });
    let Some(position) = open_position else {
        tracing::debug!(
            "[MessageMerger] No open tool call '{}' in '{}'",
            id,
            session.name
        );
        return;
    };

    session.transcript.update(position, |message| {
        message.content = result;
        message.is_complete = true;
        message.is_success = success;
        message.collapsed = true;
    });
    changes.updated(position);
}

fn reasoning_delta(
    session: &mut Session,
    id: String,
    text: &str,
    now: DateTime<Utc>,
    changes: &mut ChangeSet,
) {
    let id = if !id.is_empty() {
        id
    } else if let Some(open) = session.transcript.last_open_reasoning_id() {
        open.to_string()
    } else {
        Uuid::new_v4().to_string()
    };

    match session.transcript.reasoning_position(&id) {
        Some(position) => {
            session.transcript.update(position, |message| {
                message.content.push_str(text);
                message.is_complete = false;
                message.collapsed = false;
                message.timestamp = now;
            });
            changes.updated(position);
        }
        None => {
            let mut message = Message::reasoning(id, now).with_model(model_of(session));
            message.content.push_str(text);
            let position = session.transcript.push(message);
            changes.created(position);
        }
    }
}

fn reasoning_complete(session: &mut Session, id: &str, changes: &mut ChangeSet) {
    let targets: Vec<usize> = session
        .transcript
        .open_reasoning_positions()
        .into_iter()
        .filter(|position| {
            id.is_empty()
                || session
                    .transcript
                    .get(*position)
                    .and_then(|message| message.reasoning_id.as_deref())
                    == Some(id)
        })
        .collect();

    if targets.is_empty() {
        tracing::debug!(
            "[MessageMerger] No open reasoning block '{}' in '{}'",
            id,
            session.name
        );
        return;
    }

    for position in targets {
        session.transcript.update(position, |message| {
            message.is_complete = true;
            message.collapsed = true;
        });
        changes.updated(position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessync_core::session::{MessageKind, RemoteSessionInfo};

    async fn merger_with(names: &[&str]) -> (SessionRegistry, MessageMerger) {
        let registry = SessionRegistry::new();
        {
            let mut state = registry.write().await;
            for name in names {
                let info = RemoteSessionInfo {
                    name: name.to_string(),
                    model: "sonnet".to_string(),
                    created_at: Utc::now(),
                    session_id: format!("sid-{name}"),
                    working_directory: "/work".to_string(),
                    is_processing: false,
                    message_count: 0,
                };
                state
                    .sessions
                    .insert(name.to_string(), Session::from_remote(&info, Utc::now()));
            }
        }
        let merger = MessageMerger::new(registry.clone());
        (registry, merger)
    }

    fn delta(text: &str) -> SessionEvent {
        SessionEvent::ContentDelta {
            text: text.to_string(),
        }
    }

    fn reasoning(id: &str, text: &str) -> SessionEvent {
        SessionEvent::ReasoningDelta {
            id: id.to_string(),
            text: text.to_string(),
        }
    }

    fn tool_start(id: &str) -> SessionEvent {
        SessionEvent::ToolStarted {
            name: "bash".to_string(),
            id: id.to_string(),
        }
    }

    fn tool_done(id: &str, result: &str, success: bool) -> SessionEvent {
        SessionEvent::ToolCompleted {
            id: id.to_string(),
            result: result.to_string(),
            success,
        }
    }

    #[tokio::test]
    async fn test_content_deltas_accumulate_in_one_open_message() {
        let (registry, merger) = merger_with(&["s"]).await;

        let first = merger.apply("s", delta("a")).await;
        assert!(first.change().unwrap().touched[0].created);
        let second = merger.apply("s", delta("b")).await;
        assert!(!second.change().unwrap().touched[0].created);

        let transcript = registry.transcript("s").await.unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].kind, MessageKind::Assistant);
        assert_eq!(transcript[0].content, "ab");
        assert!(!transcript[0].is_complete);
        assert_eq!(transcript[0].model.as_deref(), Some("sonnet"));
    }

    #[tokio::test]
    async fn test_turn_end_closes_assistant_and_next_delta_opens_another() {
        let (registry, merger) = merger_with(&["s"]).await;

        merger.apply("s", SessionEvent::TurnStart).await;
        merger.apply("s", delta("first")).await;
        let end = merger.apply("s", SessionEvent::TurnEnd).await;
        assert_eq!(end.change().unwrap().processing, Some(false));
        merger.apply("s", delta("second")).await;

        let transcript = registry.transcript("s").await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert!(transcript[0].is_complete);
        assert!(!transcript[1].is_complete);
        assert_eq!(transcript[1].order_index, 1);
        assert!(!registry.get("s").await.unwrap().is_processing);
    }

    #[tokio::test]
    async fn test_tool_lifecycle_completes_only_matching_id() {
        let (registry, merger) = merger_with(&["s"]).await;

        merger.apply("s", tool_start("id1")).await;
        merger.apply("s", tool_start("id2")).await;
        assert!(merger.apply("s", tool_done("id1", "ok", true)).await.is_changed());

        let transcript = registry.transcript("s").await.unwrap();
        assert_eq!(transcript.len(), 2);
        let done = &transcript[0];
        assert_eq!(
            (done.is_complete, done.is_success, done.content.as_str()),
            (true, true, "ok")
        );
        assert!(done.collapsed);
        assert!(!transcript[1].is_complete);

        let before = registry.transcript("s").await.unwrap();
        assert_eq!(
            merger.apply("s", tool_done("unknown", "x", false)).await,
            ApplyOutcome::Ignored
        );
        assert_eq!(registry.transcript("s").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_completed_tool_call_is_immutable() {
        let (registry, merger) = merger_with(&["s"]).await;

        merger.apply("s", tool_start("t")).await;
        merger.apply("s", tool_done("t", "ok", true)).await;
        assert_eq!(
            merger.apply("s", tool_done("t", "late", false)).await,
            ApplyOutcome::Ignored
        );

        let transcript = registry.transcript("s").await.unwrap();
        assert_eq!(transcript[0].content, "ok");
        assert!(transcript[0].is_success);
    }

    #[tokio::test]
    async fn test_duplicate_tool_start_is_absorbed() {
        let (registry, merger) = merger_with(&["s"]).await;

        merger.apply("s", tool_start("t")).await;
        assert_eq!(merger.apply("s", tool_start("t")).await, ApplyOutcome::Ignored);
        assert_eq!(registry.transcript("s").await.unwrap().len(), 1);

        // Once complete, the id may be reused by a new call.
        merger.apply("s", tool_done("t", "ok", true)).await;
        merger.apply("s", tool_start("t")).await;
        merger.apply("s", tool_done("t", "again", true)).await;
        let transcript = registry.transcript("s").await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].content, "ok");
        assert_eq!(transcript[1].content, "again");
    }

    #[tokio::test]
    async fn test_blank_reasoning_id_continues_open_block() {
        let (registry, merger) = merger_with(&["s"]).await;

        merger.apply("s", reasoning("r1", "foo")).await;
        merger.apply("s", reasoning("", "bar")).await;

        let transcript = registry.transcript("s").await.unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].content, "foobar");
        assert_eq!(transcript[0].reasoning_id.as_deref(), Some("r1"));
        assert!(!transcript[0].collapsed);
    }

    #[tokio::test]
    async fn test_blank_reasoning_id_without_open_block_starts_new_one() {
        let (registry, merger) = merger_with(&["s"]).await;

        merger.apply("s", reasoning("r1", "one")).await;
        merger
            .apply(
                "s",
                SessionEvent::ReasoningComplete {
                    id: "r1".to_string(),
                },
            )
            .await;
        merger.apply("s", reasoning("", "two")).await;

        let transcript = registry.transcript("s").await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert!(transcript[0].is_complete);
        assert!(transcript[0].collapsed);
        assert_eq!(transcript[1].content, "two");
        let fresh_id = transcript[1].reasoning_id.as_deref().unwrap();
        assert!(!fresh_id.is_empty());
        assert_ne!(fresh_id, "r1");
    }

    #[tokio::test]
    async fn test_reasoning_delta_reactivates_completed_block() {
        let (registry, merger) = merger_with(&["s"]).await;

        merger.apply("s", reasoning("r1", "a")).await;
        merger
            .apply(
                "s",
                SessionEvent::ReasoningComplete {
                    id: "r1".to_string(),
                },
            )
            .await;
        merger.apply("s", reasoning("r1", "b")).await;

        let transcript = registry.transcript("s").await.unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].content, "ab");
        assert!(!transcript[0].is_complete);
        assert!(!transcript[0].collapsed);
    }

    #[tokio::test]
    async fn test_blank_reasoning_complete_closes_every_open_block() {
        let (registry, merger) = merger_with(&["s"]).await;

        merger.apply("s", reasoning("r1", "a")).await;
        merger.apply("s", reasoning("r2", "b")).await;
        let outcome = merger
            .apply("s", SessionEvent::ReasoningComplete { id: String::new() })
            .await;
        assert_eq!(outcome.change().unwrap().touched.len(), 2);

        let transcript = registry.transcript("s").await.unwrap();
        assert!(transcript.iter().all(|m| m.is_complete && m.collapsed));

        assert_eq!(
            merger
                .apply("s", SessionEvent::ReasoningComplete { id: String::new() })
                .await,
            ApplyOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_unknown_session_is_ignored() {
        let (registry, merger) = merger_with(&["s"]).await;

        assert_eq!(merger.apply("ghost", delta("x")).await, ApplyOutcome::Ignored);
        assert_eq!(
            merger.submit_user_message("ghost", "hi").await,
            ApplyOutcome::Ignored
        );
        assert!(!registry.contains("ghost").await);
    }

    #[tokio::test]
    async fn test_turn_start_twice_reports_one_flip() {
        let (_registry, merger) = merger_with(&["s"]).await;

        let first = merger.apply("s", SessionEvent::TurnStart).await;
        assert_eq!(first.change().unwrap().processing, Some(true));
        assert_eq!(
            merger.apply("s", SessionEvent::TurnStart).await,
            ApplyOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_mutation_refreshes_last_updated() {
        let (registry, merger) = merger_with(&["s"]).await;
        let before = registry.get("s").await.unwrap().last_updated_at;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        merger.apply("s", delta("x")).await;

        assert!(registry.get("s").await.unwrap().last_updated_at > before);
    }

    #[tokio::test]
    async fn test_local_user_and_error_messages_are_complete() {
        let (registry, merger) = merger_with(&["s"]).await;

        merger.submit_user_message("s", "hello").await;
        merger.record_error("s", "backend unavailable").await;

        let transcript = registry.transcript("s").await.unwrap();
        assert_eq!(transcript[0].kind, MessageKind::User);
        assert_eq!(transcript[1].kind, MessageKind::Error);
        assert!(transcript.iter().all(|m| m.is_complete));
        assert_eq!(
            transcript.iter().map(|m| m.order_index).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }
}
