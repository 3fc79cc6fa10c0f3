//! Domain layer for sessync.
//!
//! Holds the mirrored session model, the transcript and its correlation
//! indices, the transport event vocabulary, and the traits the application
//! layer depends on (`HistoryRepository`, `SessionTransport`).

pub mod config;
pub mod error;
pub mod session;

// Re-export common error type
pub use error::SessyncError;
