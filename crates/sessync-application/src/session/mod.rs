//! Session mirror services.
//!
//! This module contains the registry of mirrored sessions and the services
//! that keep it consistent: the streaming merger, the roster reconciler,
//! history backfill and the transcript recorder.

mod backfill;
mod merger;
mod reconciler;
mod recorder;
mod registry;

pub use backfill::HistoryBackfill;
pub use merger::{AppliedChange, ApplyOutcome, MessageMerger, TouchedMessage};
pub use reconciler::{ReconcileOutcome, SessionReconciler};
pub use recorder::TranscriptRecorder;
pub use registry::SessionRegistry;
