use std::path::Path;

use anyhow::{Context, Result};
use sessync_core::session::{HistoryRepository, Message, StoredMessage};
use sessync_infrastructure::AsyncDirHistoryRepository;

pub async fn open_store(data_dir: &Path) -> Result<AsyncDirHistoryRepository> {
    AsyncDirHistoryRepository::new(data_dir)
        .await
        .with_context(|| format!("Failed to open history store at {}", data_dir.display()))
}

pub async fn show(
    store: &dyn HistoryRepository,
    session: &str,
    limit: usize,
    offset: usize,
    json: bool,
) -> Result<()> {
    let records = store
        .get_page(session, limit, offset)
        .await
        .with_context(|| format!("Failed to read history for '{}'", session))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No stored messages for '{}'", session);
        return Ok(());
    }
    for record in &records {
        println!("{}", format_record(record));
    }
    Ok(())
}

pub async fn count(store: &dyn HistoryRepository, session: &str) -> Result<()> {
    let count = store
        .count(session)
        .await
        .with_context(|| format!("Failed to count history for '{}'", session))?;
    println!("{}", count);
    Ok(())
}

pub async fn clear(store: &dyn HistoryRepository, session: &str) -> Result<()> {
    store
        .clear(session)
        .await
        .with_context(|| format!("Failed to clear history for '{}'", session))?;
    println!("Cleared history for '{}'", session);
    Ok(())
}

/// Replaces a session's history with the messages in a JSON array file.
pub async fn import(store: &dyn HistoryRepository, session: &str, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let messages: Vec<Message> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of messages", file.display()))?;

    let records: Vec<StoredMessage> = messages.iter().map(StoredMessage::from_message).collect();
    let imported = records.len();
    store
        .bulk_replace(session, records)
        .await
        .with_context(|| format!("Failed to import history for '{}'", session))?;

    tracing::info!("[history] Imported {} messages into '{}'", imported, session);
    println!("Imported {} messages into '{}'", imported, session);
    Ok(())
}

/// One line per record: `#index kind [status] content`.
pub fn format_record(record: &StoredMessage) -> String {
    let kind = serde_json::to_value(record.kind)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", record.kind));

    let mut line = format!("#{} {}", record.order_index, kind);
    if let Some(tool) = &record.tool_name {
        line.push_str(&format!(" {}", tool));
    }
    if !record.is_complete {
        line.push_str(" [open]");
    } else if record.tool_call_id.is_some() && !record.is_success {
        line.push_str(" [failed]");
    }
    if !record.content.is_empty() {
        line.push_str(": ");
        line.push_str(&record.content.replace('\n', "\\n"));
    }
    line
}
