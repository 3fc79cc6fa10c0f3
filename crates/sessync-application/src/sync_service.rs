//! Event routing and the service run loop.
//!
//! `SessionSyncService` wires the registry, merger, reconciler, recorder and
//! notifier together. Roster-level transport events trigger a refresh;
//! per-session events go through the merger and then to the recorder and
//! the notifier.

use std::sync::Arc;
use std::time::Duration;

use sessync_core::config::SyncConfig;
use sessync_core::error::Result;
use sessync_core::session::{
    EventTarget, HistoryRepository, RemoteSessionInfo, SessionEvent, SessionTransport,
    TransportEvent,
};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::notifier::{UiNotification, UiNotifier};
use crate::session::{
    ApplyOutcome, HistoryBackfill, MessageMerger, ReconcileOutcome, SessionReconciler,
    SessionRegistry, TranscriptRecorder,
};

pub struct SessionSyncService {
    registry: SessionRegistry,
    merger: MessageMerger,
    reconciler: SessionReconciler,
    recorder: Option<TranscriptRecorder>,
    notifier: Option<UiNotifier>,
    reconcile_interval: Duration,
    /// Stops in-flight backfills when the service shuts down.
    shutdown: CancellationToken,
}

impl SessionSyncService {
    /// Creates a service over `transport`.
    ///
    /// With a history store, new sessions are seeded from it and adopted
    /// cached histories are imported into it; live changes are recorded only
    /// when `persist_transcripts` is set.
    pub fn new(
        transport: Arc<dyn SessionTransport>,
        history: Option<Arc<dyn HistoryRepository>>,
        config: &SyncConfig,
    ) -> Self {
        let registry = SessionRegistry::new();
        let shutdown = CancellationToken::new();
        let backfill = HistoryBackfill::new(transport.clone(), shutdown.child_token());
        let recorder = history
            .as_ref()
            .filter(|_| config.persist_transcripts)
            .map(|history| TranscriptRecorder::new(history.clone()));

        Self {
            merger: MessageMerger::new(registry.clone()),
            reconciler: SessionReconciler::new(registry.clone(), transport, history, backfill),
            registry,
            recorder,
            notifier: None,
            reconcile_interval: config.reconcile_interval(),
            shutdown,
        }
    }

    pub fn with_notifier(mut self, notifier: UiNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn reconciler(&self) -> &SessionReconciler {
        &self.reconciler
    }

    /// Routes one transport event.
    ///
    /// Only a failed roster read surfaces as an error; per-session events
    /// always succeed.
    pub async fn handle_event(&self, event: TransportEvent) -> Result<()> {
        match event.into_target() {
            EventTarget::Roster => {
                self.refresh().await?;
            }
            EventTarget::Session { name, event } => {
                self.apply(&name, event).await;
            }
        }
        Ok(())
    }

    pub async fn apply(&self, session_name: &str, event: SessionEvent) -> ApplyOutcome {
        let outcome = self.merger.apply(session_name, event).await;
        self.after_apply(&outcome).await;
        outcome
    }

    /// Appends a locally typed prompt to the session's transcript.
    pub async fn submit_user_message(&self, session_name: &str, text: &str) -> ApplyOutcome {
        let outcome = self.merger.submit_user_message(session_name, text).await;
        self.after_apply(&outcome).await;
        outcome
    }

    pub async fn record_error(&self, session_name: &str, text: &str) -> ApplyOutcome {
        let outcome = self.merger.record_error(session_name, text).await;
        self.after_apply(&outcome).await;
        outcome
    }

    pub async fn refresh(&self) -> Result<ReconcileOutcome> {
        let outcome = self.reconciler.refresh().await?;
        self.after_reconcile(&outcome).await;
        Ok(outcome)
    }

    pub async fn reconcile(
        &self,
        snapshot: &[RemoteSessionInfo],
        remote_active: Option<&str>,
    ) -> ReconcileOutcome {
        let outcome = self.reconciler.reconcile(snapshot, remote_active).await;
        self.after_reconcile(&outcome).await;
        outcome
    }

    pub async fn register_pending(&self, info: &RemoteSessionInfo) -> bool {
        let registered = self.reconciler.register_pending(info).await;
        if registered {
            self.notify(UiNotification::SessionsChanged);
        }
        registered
    }

    pub async fn select_active(&self, name: &str) -> bool {
        let selected = self.reconciler.select_active(name).await;
        if selected {
            self.notify(UiNotification::ActiveSessionChanged {
                name: Some(name.to_string()),
            });
        }
        selected
    }

    /// Runs until `cancel` fires or the event stream closes.
    ///
    /// Events are handled in arrival order. The roster is reconciled once on
    /// start and then every `reconcile_interval`. On exit, in-flight
    /// backfills are cancelled.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<TransportEvent>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            "[SessionSyncService] Started, reconciling every {:?}",
            self.reconcile_interval
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::info!("[SessionSyncService] Cancelled");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle_event(event).await {
                            tracing::warn!("[SessionSyncService] Roster refresh failed: {}", e);
                        }
                    }
                    None => {
                        tracing::info!("[SessionSyncService] Event stream closed");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        tracing::warn!("[SessionSyncService] Periodic reconcile failed: {}", e);
                    }
                }
            }
        }

        self.shutdown.cancel();
    }

    async fn after_apply(&self, outcome: &ApplyOutcome) {
        let Some(change) = outcome.change() else {
            return;
        };
        if let Some(recorder) = &self.recorder {
            recorder.record(change).await;
        }
        if let Some(notifier) = &self.notifier {
            notifier.applied(change);
        }
    }

    async fn after_reconcile(&self, outcome: &ReconcileOutcome) {
        if outcome.is_noop() {
            return;
        }
        if let Some(notifier) = &self.notifier {
            let active = self.registry.active_session().await;
            notifier.reconciled(outcome, active);
        }
    }

    fn notify(&self, notification: UiNotification) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(notification);
        }
    }
}
