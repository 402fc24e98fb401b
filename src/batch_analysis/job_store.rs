//! Durable mapping from item id to its analysis job record.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use super::models::{AnalysisJob, JobState};
use crate::content_store::{ContentStore, ItemId};

/// Meta key under which the serialized job record lives.
pub const ANALYSIS_STATE_META_KEY: &str = "analysis_state";

/// Storage for job records, one per item.
pub trait JobStore: Send + Sync {
    fn get(&self, item_id: ItemId) -> Result<Option<AnalysisJob>>;

    /// Insert or overwrite the record for `job.item_id`.
    fn put(&self, job: &AnalysisJob) -> Result<()>;

    /// Overwrite the record with `job` only if it still equals `expected`.
    ///
    /// Returns false when someone else wrote the record in between, for
    /// example a re-enqueue while a remote call was in flight.
    fn replace(&self, expected: &AnalysisJob, job: &AnalysisJob) -> Result<bool>;

    fn delete(&self, item_id: ItemId) -> Result<()>;

    /// All records currently in `state`, ordered by item id.
    fn list_by_state(&self, state: JobState) -> Result<Vec<AnalysisJob>>;
}

/// Job store persisting each record as JSON in the content store's
/// per-item metadata.
pub struct MetaJobStore {
    content_store: Arc<dyn ContentStore>,
}

impl MetaJobStore {
    pub fn new(content_store: Arc<dyn ContentStore>) -> Self {
        Self { content_store }
    }

    fn decode(item_id: ItemId, raw: &str) -> Result<AnalysisJob> {
        serde_json::from_str(raw)
            .with_context(|| format!("Corrupt analysis state for item {}", item_id))
    }
}

impl JobStore for MetaJobStore {
    fn get(&self, item_id: ItemId) -> Result<Option<AnalysisJob>> {
        match self
            .content_store
            .get_meta(item_id, ANALYSIS_STATE_META_KEY)?
        {
            Some(raw) => Ok(Some(Self::decode(item_id, &raw)?)),
            None => Ok(None),
        }
    }

    fn put(&self, job: &AnalysisJob) -> Result<()> {
        let raw = serde_json::to_string(job)?;
        self.content_store
            .set_meta(job.item_id, ANALYSIS_STATE_META_KEY, &raw)
            .with_context(|| format!("Failed to persist analysis state for item {}", job.item_id))
    }

    fn replace(&self, expected: &AnalysisJob, job: &AnalysisJob) -> Result<bool> {
        let expected_raw = serde_json::to_string(expected)?;
        let raw = serde_json::to_string(job)?;
        self.content_store
            .compare_and_set_meta(job.item_id, ANALYSIS_STATE_META_KEY, &expected_raw, &raw)
            .with_context(|| format!("Failed to persist analysis state for item {}", job.item_id))
    }

    fn delete(&self, item_id: ItemId) -> Result<()> {
        self.content_store
            .delete_meta(item_id, ANALYSIS_STATE_META_KEY)
    }

    fn list_by_state(&self, state: JobState) -> Result<Vec<AnalysisJob>> {
        let mut jobs = Vec::new();
        for (item_id, raw) in self.content_store.list_meta(ANALYSIS_STATE_META_KEY)? {
            // One unreadable record must not stall every other job.
            match Self::decode(item_id, &raw) {
                Ok(job) if job.state == state => jobs.push(job),
                Ok(_) => {}
                Err(e) => warn!("Skipping analysis record: {:#}", e),
            }
        }
        Ok(jobs)
    }
}
