//! Application layer for sessync.
//!
//! This crate keeps the local session mirror consistent: it merges
//! streaming events into transcripts, reconciles roster snapshots, and
//! coordinates persistence and UI notification around both.

pub mod notifier;
pub mod session;
pub mod sync_service;

pub use notifier::{UiNotification, UiNotifier};
pub use sync_service::SessionSyncService;
