use serde::Serialize;
use tokio::sync::mpsc;

use crate::session::{AppliedChange, ReconcileOutcome};

/// Notifications queued for the presentation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiNotification {
    SessionsChanged,
    TranscriptChanged { session: String },
    ProcessingChanged { session: String, is_processing: bool },
    ActiveSessionChanged { name: Option<String> },
}

/// Sending half of the UI notification queue.
///
/// Sends never block and never fail; once the receiver is gone notifications
/// are dropped.
#[derive(Debug, Clone)]
pub struct UiNotifier {
    sender: mpsc::UnboundedSender<UiNotification>,
}

impl UiNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiNotification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn notify(&self, notification: UiNotification) {
        if self.sender.send(notification).is_err() {
            tracing::debug!("[UiNotifier] Receiver dropped, notification discarded");
        }
    }

    /// Queues the notifications for one applied event.
    pub fn applied(&self, change: &AppliedChange) {
        if let Some(is_processing) = change.processing {
            self.notify(UiNotification::ProcessingChanged {
                session: change.session.clone(),
                is_processing,
            });
        }
        if !change.touched.is_empty() {
            self.notify(UiNotification::TranscriptChanged {
                session: change.session.clone(),
            });
        }
    }

    /// Queues the notifications for one reconcile pass.
    pub fn reconciled(&self, outcome: &ReconcileOutcome, active: Option<String>) {
        if outcome.roster_changed() {
            self.notify(UiNotification::SessionsChanged);
        }
        for session in &outcome.replaced_transcripts {
            self.notify(UiNotification::TranscriptChanged {
                session: session.clone(),
            });
        }
        if outcome.active_changed {
            self.notify(UiNotification::ActiveSessionChanged { name: active });
        }
    }
}
