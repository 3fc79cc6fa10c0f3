//! In-memory HistoryRepository, used for `--no-persist` runs and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sessync_core::error::Result;
use sessync_core::session::{HistoryLog, HistoryRepository, StoredMessage};
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
pub struct MemoryHistoryRepository {
    logs: RwLock<HashMap<String, Arc<Mutex<HistoryLog>>>>,
}

impl MemoryHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn log_for(&self, session_key: &str) -> Arc<Mutex<HistoryLog>> {
        if let Some(log) = self.logs.read().await.get(session_key) {
            return log.clone();
        }
        self.logs
            .write()
            .await
            .entry(session_key.to_string())
            .or_default()
            .clone()
    }

    async fn existing(&self, session_key: &str) -> Option<Arc<Mutex<HistoryLog>>> {
        self.logs.read().await.get(session_key).cloned()
    }
}

#[async_trait]
impl HistoryRepository for MemoryHistoryRepository {
    async fn append(&self, session_key: &str, message: StoredMessage) -> Result<String> {
        let log = self.log_for(session_key).await;
        let id = log.lock().await.append(session_key, message);
        Ok(id)
    }

    async fn get_page(
        &self,
        session_key: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredMessage>> {
        match self.existing(session_key).await {
            Some(log) => Ok(log.lock().await.page(limit, offset)),
            None => Ok(Vec::new()),
        }
    }

    async fn get_all(&self, session_key: &str) -> Result<Vec<StoredMessage>> {
        match self.existing(session_key).await {
            Some(log) => Ok(log.lock().await.records().to_vec()),
            None => Ok(Vec::new()),
        }
    }

    async fn update_tool_result(
        &self,
        session_key: &str,
        tool_call_id: &str,
        content: &str,
        success: bool,
    ) -> Result<bool> {
        match self.existing(session_key).await {
            Some(log) => Ok(log
                .lock()
                .await
                .update_tool_result(tool_call_id, content, success)),
            None => Ok(false),
        }
    }

    async fn update_reasoning(
        &self,
        session_key: &str,
        reasoning_id: &str,
        content: &str,
        complete: bool,
    ) -> Result<bool> {
        match self.existing(session_key).await {
            Some(log) => Ok(log
                .lock()
                .await
                .update_reasoning(reasoning_id, content, complete)),
            None => Ok(false),
        }
    }

    async fn complete_assistant(&self, session_key: &str, content: &str) -> Result<bool> {
        match self.existing(session_key).await {
            Some(log) => Ok(log.lock().await.complete_assistant(content)),
            None => Ok(false),
        }
    }

    async fn bulk_replace(&self, session_key: &str, messages: Vec<StoredMessage>) -> Result<()> {
        let log = self.log_for(session_key).await;
        log.lock().await.replace_all(session_key, messages);
        Ok(())
    }

    async fn clear(&self, session_key: &str) -> Result<()> {
        if let Some(log) = self.existing(session_key).await {
            *log.lock().await = HistoryLog::new();
        }
        Ok(())
    }

    async fn count(&self, session_key: &str) -> Result<usize> {
        match self.existing(session_key).await {
            Some(log) => Ok(log.lock().await.len()),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sessync_core::session::Message;

    #[tokio::test]
    async fn keys_are_isolated() {
        let repo = MemoryHistoryRepository::new();
        let record = StoredMessage::from_message(&Message::user("hi", Utc::now()));

        repo.append("alpha", record.clone()).await.unwrap();
        repo.append("alpha", record.clone()).await.unwrap();
        repo.append("beta", record).await.unwrap();

        assert_eq!(repo.count("alpha").await.unwrap(), 2);
        assert_eq!(repo.count("beta").await.unwrap(), 1);
        assert_eq!(repo.get_all("beta").await.unwrap()[0].order_index, 0);

        repo.clear("alpha").await.unwrap();
        assert_eq!(repo.count("alpha").await.unwrap(), 0);
        assert_eq!(repo.count("beta").await.unwrap(), 1);
    }
}
