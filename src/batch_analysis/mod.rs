//! Batch content analysis.
//!
//! Content items are queued, submitted to a remote analysis service, polled
//! for their result and rewritten with the analyzed text. Job records live in
//! the content store's metadata so they survive restarts, and a one-shot task
//! re-arms itself for as long as work remains.

pub mod audit;
pub mod job_store;
pub mod models;
pub mod processor;
pub mod queue;
pub mod remote;
pub mod retry_policy;
pub mod selection;
pub mod service;

pub use audit::{AnalysisAuditStore, AuditEntry, NoOpAuditStore, SqliteAuditStore};
pub use job_store::{JobStore, MetaJobStore, ANALYSIS_STATE_META_KEY};
pub use models::*;
pub use processor::{BatchProcessor, ProcessorSettings};
pub use queue::QueueManager;
pub use remote::{HttpRemoteAnalyzer, RemoteAnalyzer};
pub use retry_policy::RetryPolicy;
pub use selection::{has_annotation_marker, AutoSelector};
pub use service::BatchAnalysisService;
