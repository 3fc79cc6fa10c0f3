use serde::{Deserialize, Serialize};
use sessync_core::session::HistoryLog;

/// Current on-disk layout version of a history file.
pub const HISTORY_FILE_VERSION: u32 = 1;

/// One session's history as written to `history/<encoded key>.json`.
///
/// ```json
/// { "version": 1, "session_key": "alpha", "records": [ ... ] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryFile {
    pub version: u32,
    pub session_key: String,
    #[serde(flatten)]
    pub log: HistoryLog,
}

impl HistoryFile {
    pub fn empty(session_key: &str) -> Self {
        Self {
            version: HISTORY_FILE_VERSION,
            session_key: session_key.to_string(),
            log: HistoryLog::new(),
        }
    }
}
