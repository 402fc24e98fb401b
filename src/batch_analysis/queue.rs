//! Queue Manager: enqueue operations and the two observable queues.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use super::job_store::JobStore;
use super::models::{AnalysisJob, JobState, JobView};
use crate::content_store::ItemId;

pub struct QueueManager {
    store: Arc<dyn JobStore>,
}

impl QueueManager {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Upsert a fresh QUEUED record for each id.
    ///
    /// Any previous record for the item is replaced, which resets the attempt
    /// counter and drops a stale remote token or error. Repeated ids are
    /// written once.
    pub fn enqueue(&self, item_ids: &[ItemId], link_mode: &str) -> Result<Vec<AnalysisJob>> {
        let mut seen = HashSet::with_capacity(item_ids.len());
        let mut jobs = Vec::with_capacity(item_ids.len());
        for &item_id in item_ids.iter().filter(|id| seen.insert(**id)) {
            let job = AnalysisJob::queued(item_id, link_mode);
            self.store.put(&job)?;
            debug!("Queued item {} for analysis (links: {})", item_id, link_mode);
            jobs.push(job);
        }
        Ok(jobs)
    }

    pub fn waiting_for_analysis(&self) -> Result<BTreeMap<ItemId, JobView>> {
        self.view_of(JobState::Queued)
    }

    pub fn waiting_for_response(&self) -> Result<BTreeMap<ItemId, JobView>> {
        self.view_of(JobState::AwaitingResult)
    }

    pub fn state_of(&self, item_id: ItemId) -> Result<Option<JobState>> {
        Ok(self.store.get(item_id)?.map(|job| job.state))
    }

    pub fn job(&self, item_id: ItemId) -> Result<Option<AnalysisJob>> {
        self.store.get(item_id)
    }

    /// True when any job still needs a tick, including ones interrupted mid-submit.
    pub fn has_pending_work(&self) -> Result<bool> {
        for state in [JobState::Queued, JobState::Submitted, JobState::AwaitingResult] {
            if !self.store.list_by_state(state)?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn view_of(&self, state: JobState) -> Result<BTreeMap<ItemId, JobView>> {
        Ok(self
            .store
            .list_by_state(state)?
            .iter()
            .map(|job| (job.item_id, job.view()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch_analysis::job_store::MetaJobStore;
    use crate::content_store::SqliteContentStore;

    fn make_queue() -> (Arc<MetaJobStore>, QueueManager) {
        let content = Arc::new(SqliteContentStore::in_memory().unwrap());
        let store = Arc::new(MetaJobStore::new(content));
        (store.clone(), QueueManager::new(store))
    }

    #[test]
    fn test_enqueue_creates_queued_records() {
        let (_, queue) = make_queue();
        queue.enqueue(&[1, 2], "default").unwrap();

        let waiting = queue.waiting_for_analysis().unwrap();
        assert_eq!(waiting.len(), 2);
        assert_eq!(
            waiting.get(&1),
            Some(&JobView {
                id: 1,
                link: "default".to_string()
            })
        );
        assert_eq!(queue.state_of(2).unwrap(), Some(JobState::Queued));
        assert_eq!(queue.state_of(3).unwrap(), None);
    }

    #[test]
    fn test_enqueue_twice_keeps_latest_link_mode() {
        let (_, queue) = make_queue();
        queue.enqueue(&[4], "default").unwrap();
        queue.enqueue(&[4], "no").unwrap();

        let waiting = queue.waiting_for_analysis().unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[&4].link, "no");
    }

    #[test]
    fn test_enqueue_skips_repeated_ids() {
        let (_, queue) = make_queue();
        let jobs = queue.enqueue(&[5, 6, 5], "default").unwrap();

        assert_eq!(
            jobs.iter().map(|j| j.item_id).collect::<Vec<_>>(),
            vec![5, 6]
        );
    }

    #[test]
    fn test_enqueue_resets_previous_record() {
        let (store, queue) = make_queue();
        let mut job = AnalysisJob::queued(8, "default");
        job.transition(JobState::Failure);
        job.attempt_count = 3;
        job.last_error = Some("boom".to_string());
        store.put(&job).unwrap();

        queue.enqueue(&[8], "default").unwrap();

        let job = queue.job(8).unwrap().unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.attempt_count, 0);
        assert!(job.last_error.is_none());
    }

    #[test]
    fn test_queues_are_disjoint() {
        let (store, queue) = make_queue();
        queue.enqueue(&[1, 2, 3], "default").unwrap();
        let mut job = queue.job(2).unwrap().unwrap();
        job.transition(JobState::AwaitingResult);
        job.remote_token = Some("t".to_string());
        store.put(&job).unwrap();

        let analysis = queue.waiting_for_analysis().unwrap();
        let response = queue.waiting_for_response().unwrap();
        assert!(analysis.keys().all(|id| !response.contains_key(id)));
        assert_eq!(analysis.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(response.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert!(queue.has_pending_work().unwrap());
    }

    #[test]
    fn test_empty_queues() {
        let (_, queue) = make_queue();
        assert!(queue.waiting_for_analysis().unwrap().is_empty());
        assert!(queue.waiting_for_response().unwrap().is_empty());
        assert!(!queue.has_pending_work().unwrap());
    }
}
