//! Batch Analysis Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod batch_analysis;
pub mod config;
pub mod content_store;
pub mod metrics;
pub mod sqlite_persistence;
pub mod task_scheduler;

// Re-export commonly used types for convenience
pub use batch_analysis::{BatchAnalysisService, HttpRemoteAnalyzer, RemoteAnalyzer};
pub use content_store::{ContentStore, SqliteContentStore};
pub use task_scheduler::{InMemoryTaskScheduler, TaskScheduler, TickRunner};
