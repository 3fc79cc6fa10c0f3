//! Session domain module.
//!
//! This module contains the mirrored session model, transcript messages,
//! the transport event vocabulary, and the persistence/transport interfaces.
//!
//! # Module Structure
//!
//! - `model`: `Session` and the roster entry `RemoteSessionInfo`
//! - `message`: transcript message types (`MessageKind`, `Message`)
//! - `transcript`: ordered message list with correlation indices
//! - `event`: transport event vocabulary and per-session events
//! - `history`: persisted record type, `HistoryLog`, `HistoryRepository`
//! - `transport`: `SessionTransport` collaborator trait

mod event;
mod history;
mod message;
mod model;
mod transcript;
mod transport;

// Re-export public API
pub use event::{EventTarget, SessionEvent, TransportEvent};
pub use history::{HistoryLog, HistoryRepository, StoredMessage, tail_window};
pub use message::{Message, MessageKind};
pub use model::{RemoteSessionInfo, Session};
pub use transcript::Transcript;
pub use transport::SessionTransport;
