//! Directory-backed HistoryRepository implementation.
//!
//! Each session key owns one JSON file written through [`AtomicJsonFile`],
//! so a crash mid-write leaves the previous version intact. Writers of the
//! same key queue on a per-key async mutex; different keys proceed in
//! parallel.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sessync_core::SessyncError;
use sessync_core::error::Result;
use sessync_core::session::{HistoryLog, HistoryRepository, StoredMessage};
use tokio::fs;
use tokio::sync::Mutex;

use crate::dto::{HISTORY_FILE_VERSION, HistoryFile};
use crate::paths::{SessyncPaths, encode_session_key};
use crate::storage::AtomicJsonFile;

/// File-per-session history store.
///
/// Directory structure:
/// ```text
/// base_dir/
/// └── history/
///     ├── alpha.json
///     └── build%20bot.json
/// ```
pub struct AsyncDirHistoryRepository {
    history_dir: PathBuf,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AsyncDirHistoryRepository {
    /// Creates a repository at the platform data directory.
    pub async fn default_location() -> Result<Self> {
        let base_dir = SessyncPaths::data_dir()?;
        Self::new(base_dir).await
    }

    /// Creates a repository rooted at `base_dir`, creating `history/` if needed.
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let history_dir = SessyncPaths::history_dir(base_dir.as_ref());
        fs::create_dir_all(&history_dir).await.map_err(|e| {
            SessyncError::io(format!(
                "Failed to create history directory {}: {}",
                history_dir.display(),
                e
            ))
        })?;

        tracing::debug!(
            "[HistoryStore] Using history directory {}",
            history_dir.display()
        );

        Ok(Self {
            history_dir,
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn history_dir(&self) -> &Path {
        &self.history_dir
    }

    fn file_for(&self, session_key: &str) -> AtomicJsonFile<HistoryFile> {
        let stem = encode_session_key(session_key);
        AtomicJsonFile::new(self.history_dir.join(format!("{stem}.json")))
    }

    /// Returns the writer lock of a key. Locks nobody else holds are pruned.
    async fn key_lock(&self, session_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(session_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Loads the log of a session; a missing file reads as empty.
    async fn read_log(&self, session_key: &str) -> Result<HistoryLog> {
        let file = self.file_for(session_key);
        let key = session_key.to_string();
        let loaded = tokio::task::spawn_blocking(move || file.load())
            .await
            .map_err(|e| SessyncError::internal(format!("history read task failed: {e}")))??;

        match loaded {
            None => Ok(HistoryLog::new()),
            Some(history) => {
                check_header(&history, &key)?;
                Ok(history.log)
            }
        }
    }

    /// Runs `f` against the session's log inside a locked read-modify-write.
    ///
    /// A file whose header is rejected is left as it is on disk.
    async fn mutate<F, R>(&self, session_key: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut HistoryLog) -> R + Send + 'static,
        R: Send + 'static,
    {
        let lock = self.key_lock(session_key).await;
        let _guard = lock.lock().await;

        let file = self.file_for(session_key);
        let key = session_key.to_string();
        tokio::task::spawn_blocking(move || {
            let default = HistoryFile::empty(&key);
            file.update(default, |history| -> Result<R> {
                check_header(history, &key)?;
                Ok(f(&mut history.log))
            })
        })
        .await
        .map_err(|e| SessyncError::internal(format!("history write task failed: {e}")))?
    }
}

fn check_header(history: &HistoryFile, session_key: &str) -> Result<()> {
    if history.version > HISTORY_FILE_VERSION {
        return Err(SessyncError::data_access(format!(
            "history for '{}' has unsupported version {}",
            session_key, history.version
        )));
    }
    if history.session_key != session_key {
        return Err(SessyncError::data_access(format!(
            "history file for '{}' belongs to '{}'",
            session_key, history.session_key
        )));
    }
    Ok(())
}

#[async_trait]
impl HistoryRepository for AsyncDirHistoryRepository {
    async fn append(&self, session_key: &str, message: StoredMessage) -> Result<String> {
        let key = session_key.to_string();
        self.mutate(session_key, move |log| log.append(&key, message))
            .await
    }

    async fn get_page(
        &self,
        session_key: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredMessage>> {
        Ok(self.read_log(session_key).await?.page(limit, offset))
    }

    async fn get_all(&self, session_key: &str) -> Result<Vec<StoredMessage>> {
        Ok(self.read_log(session_key).await?.into_records())
    }

    async fn update_tool_result(
        &self,
        session_key: &str,
        tool_call_id: &str,
        content: &str,
        success: bool,
    ) -> Result<bool> {
        let tool_call_id = tool_call_id.to_string();
        let content = content.to_string();
        self.mutate(session_key, move |log| {
            log.update_tool_result(&tool_call_id, &content, success)
        })
        .await
    }

    async fn update_reasoning(
        &self,
        session_key: &str,
        reasoning_id: &str,
        content: &str,
        complete: bool,
    ) -> Result<bool> {
        let reasoning_id = reasoning_id.to_string();
        let content = content.to_string();
        self.mutate(session_key, move |log| {
            log.update_reasoning(&reasoning_id, &content, complete)
        })
        .await
    }

    async fn complete_assistant(&self, session_key: &str, content: &str) -> Result<bool> {
        let content = content.to_string();
        self.mutate(session_key, move |log| log.complete_assistant(&content))
            .await
    }

    async fn bulk_replace(&self, session_key: &str, messages: Vec<StoredMessage>) -> Result<()> {
        let key = session_key.to_string();
        let count = messages.len();
        self.mutate(session_key, move |log| log.replace_all(&key, messages))
            .await?;
        tracing::debug!(
            "[HistoryStore] Replaced history of '{}' with {} records",
            session_key,
            count
        );
        Ok(())
    }

    async fn clear(&self, session_key: &str) -> Result<()> {
        let lock = self.key_lock(session_key).await;
        let _guard = lock.lock().await;

        let file = self.file_for(session_key);
        tokio::task::spawn_blocking(move || file.remove())
            .await
            .map_err(|e| SessyncError::internal(format!("history clear task failed: {e}")))??;
        Ok(())
    }

    async fn count(&self, session_key: &str) -> Result<usize> {
        Ok(self.read_log(session_key).await?.len())
    }
}
