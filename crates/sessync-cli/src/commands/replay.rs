//! Offline replay of a recorded transport event stream.
//!
//! Every session an event refers to is registered as pending first, so the
//! replay works without an authority. Roster events reconcile against an
//! empty roster, which never evicts pending sessions.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sessync_application::SessionSyncService;
use sessync_core::config::SyncConfig;
use sessync_core::session::{
    HistoryRepository, Message, RemoteSessionInfo, SessionTransport, TransportEvent,
};

/// A transport with no authority behind it.
struct ReplayTransport;

#[async_trait]
impl SessionTransport for ReplayTransport {
    async fn roster(&self) -> sessync_core::error::Result<Vec<RemoteSessionInfo>> {
        Ok(Vec::new())
    }

    async fn active_session_name(&self) -> Option<String> {
        None
    }

    async fn cached_history(&self, _session_name: &str) -> Option<Vec<Message>> {
        None
    }

    async fn request_history(&self, _session_name: &str) -> sessync_core::error::Result<()> {
        Ok(())
    }
}

pub async fn run(file: &Path, persist_to: Option<&Path>, config: &SyncConfig) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let events = parse_events(&content)?;

    let history: Option<Arc<dyn HistoryRepository>> = match persist_to {
        Some(data_dir) => {
            let store = super::history::open_store(data_dir).await?;
            Some(Arc::new(store) as Arc<dyn HistoryRepository>)
        }
        None => None,
    };

    let transcripts = replay(events, history, config).await;
    println!("{}", serde_json::to_string_pretty(&transcripts)?);
    Ok(())
}

/// Parses one event per line. Blank lines and `#` comments are skipped.
pub fn parse_events(content: &str) -> Result<Vec<TransportEvent>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(number, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("line {}: not a transport event", number + 1))
        })
        .collect()
}

/// Applies `events` in order and returns every session's transcript.
pub async fn replay(
    events: Vec<TransportEvent>,
    history: Option<Arc<dyn HistoryRepository>>,
    config: &SyncConfig,
) -> BTreeMap<String, Vec<Message>> {
    let config = SyncConfig {
        persist_transcripts: history.is_some(),
        ..config.clone()
    };
    let service = SessionSyncService::new(Arc::new(ReplayTransport), history, &config);

    for name in events.iter().filter_map(TransportEvent::session_name) {
        service.register_pending(&placeholder(name)).await;
    }

    let total = events.len();
    for event in events {
        if let Err(e) = service.handle_event(event).await {
            tracing::warn!("[replay] Event failed: {}", e);
        }
    }
    tracing::info!("[replay] Applied {} events", total);

    let mut transcripts = BTreeMap::new();
    for session in service.registry().snapshot().await {
        transcripts.insert(session.name, session.transcript.into_messages());
    }
    transcripts
}

fn placeholder(name: &str) -> RemoteSessionInfo {
    RemoteSessionInfo {
        name: name.to_string(),
        model: String::new(),
        created_at: Utc::now(),
        session_id: String::new(),
        working_directory: String::new(),
        is_processing: false,
        message_count: 0,
    }
}
