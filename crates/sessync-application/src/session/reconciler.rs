//! Roster reconciliation.
//!
//! The authority's roster snapshot is merged into the local registry: new
//! sessions are created (and seeded from the history store), known sessions
//! get their processing flag and message count refreshed, sessions that are
//! no longer listed are evicted unless they are still pending. Transcript
//! content is only ever taken from the transport's cached history, and only
//! when that history is at least as long as the local one.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use sessync_core::error::Result;
use sessync_core::session::{
    HistoryRepository, Message, RemoteSessionInfo, Session, SessionTransport, StoredMessage,
    Transcript,
};

use super::backfill::HistoryBackfill;
use super::registry::SessionRegistry;

/// What a reconcile pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Pending sessions confirmed by this snapshot
    pub confirmed: Vec<String>,
    /// Sessions whose processing flag or message count changed
    pub updated: Vec<String>,
    /// Sessions whose transcript was replaced by a cached history
    pub replaced_transcripts: Vec<String>,
    pub backfill_queued: Vec<String>,
    pub active_changed: bool,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.confirmed.is_empty()
            && self.updated.is_empty()
            && self.replaced_transcripts.is_empty()
            && self.backfill_queued.is_empty()
            && !self.active_changed
    }

    /// True when the set of sessions or their roster fields changed.
    pub fn roster_changed(&self) -> bool {
        !(self.added.is_empty()
            && self.removed.is_empty()
            && self.confirmed.is_empty()
            && self.updated.is_empty())
    }
}

/// Merges authoritative roster snapshots into the [`SessionRegistry`].
pub struct SessionReconciler {
    registry: SessionRegistry,
    transport: Arc<dyn SessionTransport>,
    history: Option<Arc<dyn HistoryRepository>>,
    backfill: HistoryBackfill,
}

impl SessionReconciler {
    pub fn new(
        registry: SessionRegistry,
        transport: Arc<dyn SessionTransport>,
        history: Option<Arc<dyn HistoryRepository>>,
        backfill: HistoryBackfill,
    ) -> Self {
        Self {
            registry,
            transport,
            history,
            backfill,
        }
    }

    pub fn backfill(&self) -> &HistoryBackfill {
        &self.backfill
    }

    /// Pulls the roster and remote active name from the transport and
    /// reconciles against them.
    pub async fn refresh(&self) -> Result<ReconcileOutcome> {
        let roster = self.transport.roster().await?;
        let remote_active = self.transport.active_session_name().await;
        Ok(self.reconcile(&roster, remote_active.as_deref()).await)
    }

    /// Adds a locally created session that the authority has not listed yet.
    ///
    /// Returns false if a session with that name already exists.
    pub async fn register_pending(&self, info: &RemoteSessionInfo) -> bool {
        let mut state = self.registry.write().await;
        if state.sessions.contains_key(&info.name) {
            return false;
        }
        state
            .sessions
            .insert(info.name.clone(), Session::optimistic(info, Utc::now()));
        tracing::info!("[SessionReconciler] Registered pending session '{}'", info.name);
        true
    }

    /// Records the user's choice of active session.
    ///
    /// Returns false for an unknown name. Once a choice has been made, the
    /// authority's active session is never adopted again.
    pub async fn select_active(&self, name: &str) -> bool {
        let mut state = self.registry.write().await;
        if !state.sessions.contains_key(name) {
            return false;
        }
        state.active.name = Some(name.to_string());
        state.active.ever_chosen = true;
        true
    }

    pub async fn reconcile(
        &self,
        snapshot: &[RemoteSessionInfo],
        remote_active: Option<&str>,
    ) -> ReconcileOutcome {
        // Transport and store reads happen before the registry lock is taken.
        let known: HashSet<String> = self.registry.read().await.sessions.keys().cloned().collect();

        let mut cached: HashMap<String, Transcript> = HashMap::new();
        let mut seeds: HashMap<String, Transcript> = HashMap::new();
        for info in snapshot {
            if let Some(messages) = self.transport.cached_history(&info.name).await {
                cached.insert(info.name.clone(), Transcript::from_messages(messages));
            }
            if !known.contains(&info.name) {
                if let Some(seed) = self.load_seed(&info.name).await {
                    seeds.insert(info.name.clone(), seed);
                }
            }
        }

        let mut outcome = ReconcileOutcome::default();
        let mut needs_backfill = Vec::new();
        let now = Utc::now();
        {
            let mut state = self.registry.write().await;
            let listed: HashSet<&str> = snapshot.iter().map(|info| info.name.as_str()).collect();

            let stale: Vec<String> = state
                .sessions
                .values()
                .filter(|session| !session.pending && !listed.contains(session.name.as_str()))
                .map(|session| session.name.clone())
                .collect();
            for name in stale {
                state.sessions.remove(&name);
                tracing::info!("[SessionReconciler] Evicted session '{}'", name);
                outcome.removed.push(name);
            }

            for info in snapshot {
                let session = match state.sessions.entry(info.name.clone()) {
                    Entry::Occupied(entry) => {
                        let session = entry.into_mut();
                        if session.pending {
                            session.pending = false;
                            outcome.confirmed.push(info.name.clone());
                        }
                        if session.is_processing != info.is_processing
                            || session.message_count != info.message_count
                        {
                            session.is_processing = info.is_processing;
                            session.message_count = info.message_count;
                            session.touch(now);
                            outcome.updated.push(info.name.clone());
                        }
                        session
                    }
                    Entry::Vacant(entry) => {
                        let mut session = Session::from_remote(info, now);
                        if let Some(seed) = seeds.remove(&info.name) {
                            tracing::debug!(
                                "[SessionReconciler] Seeded '{}' with {} stored messages",
                                info.name,
                                seed.len()
                            );
                            session.transcript = seed;
                        }
                        tracing::info!("[SessionReconciler] Added session '{}'", info.name);
                        outcome.added.push(info.name.clone());
                        entry.insert(session)
                    }
                };

                match cached.get(&info.name) {
                    Some(cache) => {
                        if cache.len() >= session.transcript.len()
                            && !session.transcript.same_messages(cache.messages())
                        {
                            session.transcript = cache.clone();
                            session.touch(now);
                            outcome.replaced_transcripts.push(info.name.clone());
                        }
                    }
                    None => {
                        if info.message_count > 0 && session.transcript.is_empty() {
                            needs_backfill.push(info.name.clone());
                        }
                    }
                }
            }

            let active_gone = state
                .active
                .name
                .as_ref()
                .is_some_and(|name| !state.sessions.contains_key(name));
            if active_gone {
                state.active = Default::default();
                outcome.active_changed = true;
            }

            if !state.active.ever_chosen {
                if let Some(name) = remote_active.filter(|name| state.sessions.contains_key(*name)) {
                    state.active.name = Some(name.to_string());
                    state.active.ever_chosen = true;
                    outcome.active_changed = true;
                    tracing::info!("[SessionReconciler] Adopted remote active session '{}'", name);
                }
            }
        }

        for name in cached.keys().chain(outcome.removed.iter()) {
            self.backfill.settle(name).await;
        }
        for name in needs_backfill {
            if self.backfill.request(&name).await {
                outcome.backfill_queued.push(name);
            }
        }

        for name in &outcome.replaced_transcripts {
            if let Some(cache) = cached.get(name) {
                self.import(name, cache.messages()).await;
            }
        }

        if !outcome.is_noop() {
            tracing::debug!("[SessionReconciler] Reconciled: {:?}", outcome);
        }
        outcome
    }

    async fn load_seed(&self, name: &str) -> Option<Transcript> {
        let history = self.history.as_ref()?;
        match history.get_all(name).await {
            Ok(records) if records.is_empty() => None,
            Ok(records) => Some(Transcript::from_messages(
                records.iter().map(StoredMessage::to_message).collect(),
            )),
            Err(e) => {
                tracing::warn!(
                    "[SessionReconciler] Failed to load stored history for '{}': {}",
                    name,
                    e
                );
                None
            }
        }
    }

    async fn import(&self, name: &str, messages: &[Message]) {
        let Some(history) = &self.history else {
            return;
        };
        let records = messages.iter().map(StoredMessage::from_message).collect();
        match history.bulk_replace(name, records).await {
            Ok(()) => tracing::info!(
                "[SessionReconciler] Imported {} messages for '{}'",
                messages.len(),
                name
            ),
            Err(e) => tracing::warn!(
                "[SessionReconciler] Failed to import history for '{}': {}",
                name,
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sessync_core::session::MessageKind;
    use sessync_infrastructure::MemoryHistoryRepository;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct StubTransport {
        roster: Mutex<Vec<RemoteSessionInfo>>,
        active: Mutex<Option<String>>,
        cache: Mutex<HashMap<String, Vec<Message>>>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SessionTransport for StubTransport {
        async fn roster(&self) -> Result<Vec<RemoteSessionInfo>> {
            Ok(self.roster.lock().unwrap().clone())
        }

        async fn active_session_name(&self) -> Option<String> {
            self.active.lock().unwrap().clone()
        }

        async fn cached_history(&self, session_name: &str) -> Option<Vec<Message>> {
            self.cache.lock().unwrap().get(session_name).cloned()
        }

        async fn request_history(&self, session_name: &str) -> Result<()> {
            self.requested.lock().unwrap().push(session_name.to_string());
            Ok(())
        }
    }

    fn info(name: &str, message_count: u64) -> RemoteSessionInfo {
        RemoteSessionInfo {
            name: name.to_string(),
            model: "opus".to_string(),
            created_at: Utc::now(),
            session_id: format!("sid-{name}"),
            working_directory: "/repo".to_string(),
            is_processing: false,
            message_count,
        }
    }

    fn texts(words: &[&str]) -> Vec<Message> {
        words.iter().map(|w| Message::user(*w, Utc::now())).collect()
    }

    fn setup(
        history: Option<Arc<dyn HistoryRepository>>,
    ) -> (Arc<StubTransport>, SessionRegistry, SessionReconciler) {
        let transport = Arc::new(StubTransport::default());
        let registry = SessionRegistry::new();
        let backfill = HistoryBackfill::new(transport.clone(), CancellationToken::new());
        let reconciler =
            SessionReconciler::new(registry.clone(), transport.clone(), history, backfill);
        (transport, registry, reconciler)
    }

    #[tokio::test]
    async fn test_same_snapshot_twice_is_noop() {
        let (transport, _registry, reconciler) = setup(None);
        transport
            .cache
            .lock()
            .unwrap()
            .insert("a".into(), texts(&["hi"]));
        let snapshot = vec![info("a", 1), info("b", 3)];

        let first = reconciler.reconcile(&snapshot, Some("a")).await;
        assert_eq!(first.added.len(), 2);
        assert_eq!(first.replaced_transcripts, vec!["a".to_string()]);
        assert_eq!(first.backfill_queued, vec!["b".to_string()]);
        assert!(first.active_changed);

        let second = reconciler.reconcile(&snapshot, Some("a")).await;
        assert!(second.is_noop(), "{second:?}");
    }

    #[tokio::test]
    async fn test_pending_session_survives_and_is_confirmed() {
        let (_transport, registry, reconciler) = setup(None);
        assert!(reconciler.register_pending(&info("new", 0)).await);
        assert!(!reconciler.register_pending(&info("new", 0)).await);

        let outcome = reconciler.reconcile(&[], None).await;
        assert!(outcome.removed.is_empty());
        assert!(registry.get("new").await.unwrap().pending);

        let outcome = reconciler.reconcile(&[info("new", 0)], None).await;
        assert_eq!(outcome.confirmed, vec!["new".to_string()]);
        assert!(outcome.added.is_empty());
        assert!(!registry.get("new").await.unwrap().pending);

        let outcome = reconciler.reconcile(&[], None).await;
        assert_eq!(outcome.removed, vec!["new".to_string()]);
        assert!(!registry.contains("new").await);
    }

    #[tokio::test]
    async fn test_existing_session_only_gets_roster_fields() {
        let (_transport, registry, reconciler) = setup(None);
        reconciler.reconcile(&[info("a", 0)], None).await;
        {
            let mut state = registry.write().await;
            let session = state.sessions.get_mut("a").unwrap();
            session.transcript.push(Message::user("local", Utc::now()));
        }

        let mut changed = info("a", 0);
        changed.is_processing = true;
        changed.message_count = 7;
        changed.model = "other".to_string();
        let outcome = reconciler.reconcile(&[changed], None).await;

        assert_eq!(outcome.updated, vec!["a".to_string()]);
        let session = registry.get("a").await.unwrap();
        assert!(session.is_processing);
        assert_eq!(session.message_count, 7);
        assert_eq!(session.model, "opus");
        assert_eq!(session.transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_shorter_cache_never_replaces_transcript() {
        let (transport, registry, reconciler) = setup(None);
        transport
            .cache
            .lock()
            .unwrap()
            .insert("a".into(), texts(&["1", "2", "3"]));
        reconciler.reconcile(&[info("a", 3)], None).await;
        assert_eq!(registry.transcript("a").await.unwrap().len(), 3);

        transport
            .cache
            .lock()
            .unwrap()
            .insert("a".into(), texts(&["1"]));
        let outcome = reconciler.reconcile(&[info("a", 3)], None).await;
        assert!(outcome.replaced_transcripts.is_empty());
        assert_eq!(registry.transcript("a").await.unwrap().len(), 3);

        transport
            .cache
            .lock()
            .unwrap()
            .insert("a".into(), texts(&["1", "2", "3", "4"]));
        let outcome = reconciler.reconcile(&[info("a", 4)], None).await;
        assert_eq!(outcome.replaced_transcripts, vec!["a".to_string()]);
        let transcript = registry.transcript("a").await.unwrap();
        assert_eq!(
            transcript.iter().map(|m| m.order_index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_remote_active_is_adopted_once() {
        let (_transport, registry, reconciler) = setup(None);
        let snapshot = vec![info("a", 0), info("b", 0)];

        reconciler.reconcile(&snapshot, Some("a")).await;
        assert_eq!(registry.active_session().await.as_deref(), Some("a"));

        let outcome = reconciler.reconcile(&snapshot, Some("b")).await;
        assert!(!outcome.active_changed);
        assert_eq!(registry.active_session().await.as_deref(), Some("a"));

        assert!(reconciler.select_active("b").await);
        assert!(!reconciler.select_active("ghost").await);
        reconciler.reconcile(&snapshot, Some("a")).await;
        assert_eq!(registry.active_session().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_local_choice_blocks_adoption() {
        let (_transport, registry, reconciler) = setup(None);
        reconciler.register_pending(&info("mine", 0)).await;
        reconciler.select_active("mine").await;

        reconciler
            .reconcile(&[info("mine", 0), info("theirs", 0)], Some("theirs"))
            .await;
        assert_eq!(registry.active_session().await.as_deref(), Some("mine"));
    }

    #[tokio::test]
    async fn test_new_session_is_seeded_from_store() {
        let store = Arc::new(MemoryHistoryRepository::new());
        for message in texts(&["earlier", "exchange"]) {
            store
                .append("a", StoredMessage::from_message(&message))
                .await
                .unwrap();
        }
        let (transport, registry, reconciler) = setup(Some(store as Arc<dyn HistoryRepository>));

        let outcome = reconciler.reconcile(&[info("a", 2)], None).await;
        assert!(outcome.backfill_queued.is_empty());
        let transcript = registry.transcript("a").await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].content, "exchange");
        assert!(transport.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_adopted_cache_is_imported_into_store() {
        let store = Arc::new(MemoryHistoryRepository::new());
        let (transport, _registry, reconciler) = setup(Some(store.clone() as Arc<dyn HistoryRepository>));
        let mut cache = texts(&["q"]);
        cache.push(Message::tool_call("grep", "t1", Utc::now()));
        transport.cache.lock().unwrap().insert("a".into(), cache);

        reconciler.reconcile(&[info("a", 2)], None).await;

        let stored = store.get_all("a").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].kind, MessageKind::ToolCall);
        assert_eq!(stored[1].tool_call_id.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_evicting_active_session_clears_selection() {
        let (_transport, registry, reconciler) = setup(None);
        reconciler.reconcile(&[info("a", 0)], Some("a")).await;

        let outcome = reconciler.reconcile(&[info("b", 0)], Some("b")).await;
        assert!(outcome.active_changed);
        assert_eq!(registry.active_session().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_refresh_reads_transport() {
        let (transport, registry, reconciler) = setup(None);
        *transport.roster.lock().unwrap() = vec![info("a", 0)];
        *transport.active.lock().unwrap() = Some("a".to_string());

        let outcome = reconciler.refresh().await.unwrap();
        assert_eq!(outcome.added, vec!["a".to_string()]);
        assert_eq!(registry.active_session().await.as_deref(), Some("a"));
    }
}
