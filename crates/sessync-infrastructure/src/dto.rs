//! On-disk data transfer objects.

mod history_file;

pub use history_file::{HISTORY_FILE_VERSION, HistoryFile};
