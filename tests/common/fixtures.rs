//! Test system wiring
//!
//! Builds a complete service over file-backed SQLite stores in a temporary
//! directory, so tests can also reopen them to check durability.

use super::analyzer::ScriptedAnalyzer;
use batch_analysis::batch_analysis::{
    AnalysisAuditStore, BatchAnalysisService, RemoteAnalyzer, SqliteAuditStore,
};
use batch_analysis::config::BatchAnalysisSettings;
use batch_analysis::content_store::{
    ContentStatus, ContentStore, ItemId, NewContentItem, SqliteContentStore,
};
use batch_analysis::task_scheduler::{InMemoryTaskScheduler, TaskScheduler, BATCH_ANALYZE_TASK};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Body carrying inline markup from an earlier analysis.
#[allow(dead_code)]
pub const ANNOTATED_BODY: &str =
    r#"Hello <span id="urn:enhancement-xyz" class="class" itemid="itemid">World</span>!"#;

pub struct TestSystem {
    pub content: Arc<SqliteContentStore>,
    pub scheduler: Arc<InMemoryTaskScheduler>,
    pub audit: Arc<SqliteAuditStore>,
    pub remote: Arc<ScriptedAnalyzer>,
    pub service: BatchAnalysisService,
    temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestSystem {
    pub fn new() -> Self {
        Self::with_settings(BatchAnalysisSettings::default())
    }

    pub fn with_settings(settings: BatchAnalysisSettings) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let remote = Arc::new(ScriptedAnalyzer::new());
        Self::build(temp_dir, remote.clone(), remote, settings)
    }

    /// Same wiring, but talking to a real remote client.
    pub fn with_remote(remote: Arc<dyn RemoteAnalyzer>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        Self::build(
            temp_dir,
            remote,
            Arc::new(ScriptedAnalyzer::new()),
            BatchAnalysisSettings::default(),
        )
    }

    fn build(
        temp_dir: TempDir,
        remote: Arc<dyn RemoteAnalyzer>,
        scripted: Arc<ScriptedAnalyzer>,
        settings: BatchAnalysisSettings,
    ) -> Self {
        let content = Arc::new(
            SqliteContentStore::new(temp_dir.path().join("content.db"))
                .expect("Failed to open content store"),
        );
        let audit = Arc::new(
            SqliteAuditStore::new(temp_dir.path().join("analysis_audit.db"))
                .expect("Failed to open audit store"),
        );
        let scheduler = Arc::new(InMemoryTaskScheduler::new());
        let service = BatchAnalysisService::new(
            content.clone(),
            remote,
            scheduler.clone(),
            audit.clone() as Arc<dyn AnalysisAuditStore>,
            &settings,
        );
        Self {
            content,
            scheduler,
            audit,
            remote: scripted,
            service,
            temp_dir,
        }
    }

    pub fn db_dir(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    pub fn insert(&self, content_type: &str, status: ContentStatus, body: &str) -> ItemId {
        self.content
            .insert_item(NewContentItem::new(content_type, status, body))
            .expect("Failed to insert item")
    }

    pub fn published_post(&self, body: &str) -> ItemId {
        self.insert("post", ContentStatus::Publish, body)
    }

    pub fn body(&self, id: ItemId) -> String {
        self.content
            .get_item(id)
            .expect("Failed to read item")
            .expect("Item missing")
            .body
    }

    /// Whether a follow-up tick is armed.
    pub fn tick_armed(&self) -> bool {
        self.scheduler.next_scheduled(BATCH_ANALYZE_TASK).is_some()
    }

    /// Forget any arm made while setting up, so a test observes only what the
    /// tick does.
    pub fn disarm(&self) {
        self.scheduler.cancel(BATCH_ANALYZE_TASK);
    }
}
