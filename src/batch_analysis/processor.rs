//! Batch processor: one tick of the analysis state machine.
//!
//! ```text
//! QUEUED --submit(immediate)--> SUCCESS
//! QUEUED --submit(pending)----> AWAITING_RESULT
//! QUEUED --submit(error)------> FAILURE
//! AWAITING_RESULT --poll(200)--------> SUCCESS
//! AWAITING_RESULT --poll(not ready)--> QUEUED   (FAILURE once attempts run out)
//! AWAITING_RESULT --poll(error)------> FAILURE
//! ```
//!
//! A tick runs only while holding the `batch_analyze` lease in the content
//! store, so at most one tick is in flight across every process sharing the
//! database. Every submit is preceded by a durable SUBMITTED write. A tick
//! that finds SUBMITTED records therefore knows the tick that wrote them died
//! mid-flight, and returns them to QUEUED before doing anything else.
//!
//! Records are only ever overwritten if they still hold what this tick last
//! read or wrote. A re-enqueue that lands while a remote call is in flight
//! wins over the stale result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::audit::AnalysisAuditStore;
use super::job_store::JobStore;
use super::models::{
    AnalysisError, AnalysisJob, AnalysisRequest, ItemOutcome, JobState, SubmitOutcome, TickReport,
};
use super::remote::RemoteAnalyzer;
use super::retry_policy::RetryPolicy;
use crate::config::BatchAnalysisSettings;
use crate::content_store::ContentStore;
use crate::metrics;
use crate::task_scheduler::{TaskScheduler, BATCH_ANALYZE_TASK};

/// Request fields that come from configuration rather than the job, plus
/// tick limits.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub concurrency: usize,
    pub content_language: String,
    pub scope: String,
    /// Validity of the processing lease; renewed before every remote call.
    pub lease_ttl: Duration,
}

impl From<&BatchAnalysisSettings> for ProcessorSettings {
    fn from(settings: &BatchAnalysisSettings) -> Self {
        Self {
            concurrency: settings.concurrency.max(1),
            content_language: settings.content_language.clone(),
            scope: settings.scope.clone(),
            lease_ttl: Duration::from_secs(settings.lease_secs.max(1)),
        }
    }
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        (&BatchAnalysisSettings::default()).into()
    }
}

pub struct BatchProcessor {
    jobs: Arc<dyn JobStore>,
    content: Arc<dyn ContentStore>,
    remote: Arc<dyn RemoteAnalyzer>,
    scheduler: Arc<dyn TaskScheduler>,
    audit: Arc<dyn AnalysisAuditStore>,
    retry_policy: RetryPolicy,
    settings: ProcessorSettings,
    /// Identifies this processor as the lease holder.
    lease_owner: String,
    tick_lock: Mutex<()>,
}

impl BatchProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jobs: Arc<dyn JobStore>,
        content: Arc<dyn ContentStore>,
        remote: Arc<dyn RemoteAnalyzer>,
        scheduler: Arc<dyn TaskScheduler>,
        audit: Arc<dyn AnalysisAuditStore>,
        retry_policy: RetryPolicy,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            jobs,
            content,
            remote,
            scheduler,
            audit,
            retry_policy,
            settings,
            lease_owner: format!("{}-{:016x}", std::process::id(), rand::random::<u64>()),
            tick_lock: Mutex::new(()),
        }
    }

    /// Run one full pass over both active queues.
    ///
    /// Returns a skipped report without touching any record when another tick,
    /// in this process or another one, is already running.
    /// Per-item failures are recorded on the job and never abort the pass.
    /// Errors enumerating the job store do, and are returned.
    pub async fn tick(&self) -> Result<TickReport> {
        let Ok(_guard) = self.tick_lock.try_lock() else {
            debug!("Tick already in progress, skipping");
            return Ok(TickReport::skipped());
        };
        if !self.hold_lease()? {
            info!("Another process is running an analysis tick, skipping");
            // The holder may die without finishing; come back later.
            self.arm_within(self.retry_policy.backoff());
            return Ok(TickReport::skipped());
        }

        let result = self.run_pass().await;
        if let Err(e) = self
            .content
            .release_lease(BATCH_ANALYZE_TASK, &self.lease_owner)
        {
            warn!("Failed to release the processing lease: {:#}", e);
        }
        result
    }

    async fn run_pass(&self) -> Result<TickReport> {
        let started = Instant::now();
        let mut report = TickReport {
            recovered: self.recover_interrupted()?,
            ..Default::default()
        };

        let queued = self.jobs.list_by_state(JobState::Queued)?;
        if !queued.is_empty() {
            debug!("Submitting {} queued items", queued.len());
        }
        let outcomes: Vec<ItemOutcome> = stream::iter(queued)
            .map(|job| self.submit_job(job))
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await;
        outcomes.into_iter().for_each(|o| report.record(o));

        let awaiting = self.jobs.list_by_state(JobState::AwaitingResult)?;
        if !awaiting.is_empty() {
            debug!("Polling {} items awaiting results", awaiting.len());
        }
        let outcomes: Vec<ItemOutcome> = stream::iter(awaiting)
            .map(|job| self.poll_job(job))
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await;
        outcomes.into_iter().for_each(|o| report.record(o));

        report.rearmed = self.rearm()?;

        metrics::record_tick(started.elapsed());
        if report != TickReport::default() {
            info!(
                "Tick done in {:?}: submitted={} completed={} requeued={} failed={} dropped={} errored={} superseded={} recovered={} rearmed={}",
                started.elapsed(),
                report.submitted,
                report.completed,
                report.requeued,
                report.failed,
                report.dropped,
                report.errored,
                report.superseded,
                report.recovered,
                report.rearmed
            );
        }
        Ok(report)
    }

    /// Take or renew the cross-process lease for this processor.
    fn hold_lease(&self) -> Result<bool> {
        self.content.try_acquire_lease(
            BATCH_ANALYZE_TASK,
            &self.lease_owner,
            self.settings.lease_ttl,
        )
    }

    /// Return SUBMITTED records left behind by a dead tick to QUEUED.
    fn recover_interrupted(&self) -> Result<usize> {
        let stale = self.jobs.list_by_state(JobState::Submitted)?;
        let mut recovered = 0;
        for listed in stale {
            let mut job = listed.clone();
            job.transition(JobState::Queued);
            if !self.jobs.replace(&listed, &job)? {
                continue;
            }
            warn!(
                "Item {} was left mid-submission, returning it to the queue",
                job.item_id
            );
            self.audit_transition(Some(JobState::Submitted), &job, Some("recovered"));
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn submit_job(&self, job: AnalysisJob) -> ItemOutcome {
        let item_id = job.item_id;
        let outcome = match self.try_submit(job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to process item {}: {:#}", item_id, e);
                ItemOutcome::Errored
            }
        };
        metrics::record_job_outcome(outcome.as_str());
        outcome
    }

    async fn try_submit(&self, listed: AnalysisJob) -> Result<ItemOutcome> {
        let Some(item) = self.content.get_item(listed.item_id)? else {
            return self.drop_job(&listed);
        };
        if !self.hold_lease()? {
            bail!("processing lease lost before submitting");
        }

        let mut submitted = listed.clone();
        submitted.transition(JobState::Submitted);
        if !self.commit(&listed, &submitted)? {
            return Ok(ItemOutcome::Superseded);
        }

        let request = AnalysisRequest {
            id: item.id,
            content: item.body,
            links: submitted.link_mode.clone(),
            content_language: self.settings.content_language.clone(),
            scope: self.settings.scope.clone(),
        };

        match self.remote.submit(&request).await {
            Ok(SubmitOutcome::Immediate(analyzed)) => {
                self.complete(&submitted, JobState::Queued, &analyzed)
            }
            Ok(SubmitOutcome::Pending(token)) => {
                let token = if token.is_empty() {
                    submitted.item_id.to_string()
                } else {
                    token
                };
                let mut job = submitted.clone();
                job.remote_token = Some(token);
                job.last_error = None;
                job.transition(JobState::AwaitingResult);
                if !self.commit(&submitted, &job)? {
                    return Ok(ItemOutcome::Superseded);
                }
                debug!("Item {} submitted, awaiting result", job.item_id);
                self.audit_transition(Some(JobState::Queued), &job, None);
                Ok(ItemOutcome::Submitted)
            }
            Err(AnalysisError::InvalidItem(_)) => self.drop_job(&submitted),
            Err(e) => {
                warn!("Submission of item {} failed: {}", submitted.item_id, e);
                metrics::record_remote_error(e.kind());
                self.fail(&submitted, JobState::Queued, e.to_string())
            }
        }
    }

    async fn poll_job(&self, job: AnalysisJob) -> ItemOutcome {
        let item_id = job.item_id;
        let outcome = match self.try_poll(job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to process item {}: {:#}", item_id, e);
                ItemOutcome::Errored
            }
        };
        metrics::record_job_outcome(outcome.as_str());
        outcome
    }

    async fn try_poll(&self, listed: AnalysisJob) -> Result<ItemOutcome> {
        let token = match listed.remote_token.clone() {
            Some(token) if !token.is_empty() => token,
            _ => {
                warn!(
                    "Item {} awaits a result without a token, requeueing",
                    listed.item_id
                );
                return self.requeue(&listed, "missing remote token".to_string());
            }
        };
        if self.content.get_item(listed.item_id)?.is_none() {
            return self.drop_job(&listed);
        }
        if !self.hold_lease()? {
            bail!("processing lease lost before polling");
        }

        match self.remote.fetch_result(&token).await {
            Ok(analyzed) => self.complete(&listed, JobState::AwaitingResult, &analyzed),
            Err(e @ AnalysisError::NotReady { .. }) => {
                metrics::record_remote_error(e.kind());
                self.requeue(&listed, e.to_string())
            }
            Err(AnalysisError::InvalidItem(_)) => self.drop_job(&listed),
            Err(e) => {
                warn!("Polling item {} failed: {}", listed.item_id, e);
                metrics::record_remote_error(e.kind());
                self.fail(&listed, JobState::AwaitingResult, e.to_string())
            }
        }
    }

    /// Overwrite `expected` with `job`, unless the record changed underneath.
    fn commit(&self, expected: &AnalysisJob, job: &AnalysisJob) -> Result<bool> {
        let written = self.jobs.replace(expected, job)?;
        if !written {
            info!(
                "Item {} was re-enqueued during processing, keeping the newer record",
                job.item_id
            );
        }
        Ok(written)
    }

    /// Write the analyzed text into the item and mark the job done.
    fn complete(&self, expected: &AnalysisJob, from: JobState, analyzed: &str) -> Result<ItemOutcome> {
        // A newer request for this item supersedes this result.
        if self.jobs.get(expected.item_id)?.as_ref() != Some(expected) {
            info!(
                "Item {} was re-enqueued during processing, discarding the stale result",
                expected.item_id
            );
            return Ok(ItemOutcome::Superseded);
        }
        if !self.content.set_body(expected.item_id, analyzed)? {
            return self.drop_job(expected);
        }
        let mut job = expected.clone();
        job.remote_token = None;
        job.last_error = None;
        job.transition(JobState::Success);
        if !self.commit(expected, &job)? {
            return Ok(ItemOutcome::Superseded);
        }
        info!("Item {} analyzed", job.item_id);
        self.audit_transition(Some(from), &job, None);
        Ok(ItemOutcome::Completed)
    }

    /// Send a job whose result was not ready back for resubmission, or give up
    /// on it once the retry policy says so.
    fn requeue(&self, expected: &AnalysisJob, reason: String) -> Result<ItemOutcome> {
        let mut job = expected.clone();
        job.attempt_count += 1;
        job.remote_token = None;
        if !self.retry_policy.should_retry(job.attempt_count) {
            warn!(
                "Giving up on item {} after {} attempts",
                job.item_id, job.attempt_count
            );
            job.last_error = Some(format!(
                "gave up after {} attempts: {}",
                job.attempt_count, reason
            ));
            job.transition(JobState::Failure);
            if !self.commit(expected, &job)? {
                return Ok(ItemOutcome::Superseded);
            }
            self.audit_transition(Some(JobState::AwaitingResult), &job, job.last_error.as_deref());
            return Ok(ItemOutcome::Failed);
        }

        debug!(
            "Item {} not ready ({}), back to queue (attempt {})",
            job.item_id, reason, job.attempt_count
        );
        job.last_error = Some(reason);
        job.transition(JobState::Queued);
        if !self.commit(expected, &job)? {
            return Ok(ItemOutcome::Superseded);
        }
        self.audit_transition(Some(JobState::AwaitingResult), &job, job.last_error.as_deref());
        Ok(ItemOutcome::Requeued)
    }

    fn fail(&self, expected: &AnalysisJob, from: JobState, reason: String) -> Result<ItemOutcome> {
        let mut job = expected.clone();
        job.attempt_count += 1;
        job.remote_token = None;
        job.last_error = Some(reason);
        job.transition(JobState::Failure);
        if !self.commit(expected, &job)? {
            return Ok(ItemOutcome::Superseded);
        }
        self.audit_transition(Some(from), &job, job.last_error.as_deref());
        Ok(ItemOutcome::Failed)
    }

    /// The item is gone; nothing to recover.
    fn drop_job(&self, job: &AnalysisJob) -> Result<ItemOutcome> {
        debug!("Item {} no longer exists, dropping its job", job.item_id);
        self.jobs.delete(job.item_id)?;
        Ok(ItemOutcome::Dropped)
    }

    /// Arm the next tick while work remains, otherwise disarm.
    fn rearm(&self) -> Result<bool> {
        let waiting_for_analysis = self.jobs.list_by_state(JobState::Queued)?.len();
        let waiting_for_response = self.jobs.list_by_state(JobState::AwaitingResult)?.len();
        // Left behind by a store error mid-submit; the next tick recovers them.
        let in_flight = self.jobs.list_by_state(JobState::Submitted)?.len();
        metrics::set_queue_sizes(waiting_for_analysis, waiting_for_response);

        if waiting_for_analysis + waiting_for_response + in_flight > 0 {
            self.arm_within(self.retry_policy.backoff());
            debug!(
                "{} items still active, next tick within {:?}",
                waiting_for_analysis + waiting_for_response,
                self.retry_policy.backoff()
            );
            Ok(true)
        } else {
            self.scheduler.cancel(BATCH_ANALYZE_TASK);
            Ok(false)
        }
    }

    /// Arm the tick `delay` from now, unless it is already due sooner
    /// (for example armed immediately by an enqueue during this tick).
    fn arm_within(&self, delay: Duration) {
        let at = chrono::Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        match self.scheduler.next_scheduled(BATCH_ANALYZE_TASK) {
            Some(armed) if armed <= at => {}
            _ => self.scheduler.schedule_once(BATCH_ANALYZE_TASK, delay),
        }
    }

    fn audit_transition(&self, from: Option<JobState>, job: &AnalysisJob, detail: Option<&str>) {
        if let Err(e) = self.audit.record(from, job, detail) {
            warn!("Failed to record audit entry for item {}: {:#}", job.item_id, e);
        }
    }
}
