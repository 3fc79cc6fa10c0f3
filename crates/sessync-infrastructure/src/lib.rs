pub mod async_dir_history_repository;
pub mod config_service;
pub mod dto;
pub mod memory_history_repository;
pub mod paths;
pub mod storage;

pub use crate::async_dir_history_repository::AsyncDirHistoryRepository;
pub use crate::config_service::ConfigService;
pub use crate::memory_history_repository::MemoryHistoryRepository;
