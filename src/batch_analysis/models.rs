//! Data models for batch analysis.
//!
//! Defines job records, lifecycle states, the remote-service outcome and its
//! error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content_store::ItemId;

/// Link mode used when nothing else is requested.
pub const DEFAULT_LINK_MODE: &str = "default";

/// Lifecycle stage of an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Submitted,
    AwaitingResult,
    Success, // terminal
    Failure, // terminal
}

impl JobState {
    /// Returns true if this is a terminal state (Success or Failure).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "QUEUED",
            JobState::Submitted => "SUBMITTED",
            JobState::AwaitingResult => "AWAITING_RESULT",
            JobState::Success => "SUCCESS",
            JobState::Failure => "FAILURE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(JobState::Queued),
            "SUBMITTED" => Some(JobState::Submitted),
            "AWAITING_RESULT" => Some(JobState::AwaitingResult),
            "SUCCESS" => Some(JobState::Success),
            "FAILURE" => Some(JobState::Failure),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The job record kept for one content item.
///
/// Persisted as a single serialized value so every state change is one write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub item_id: ItemId,
    /// How the remote service renders discovered links; passed through untouched.
    pub link_mode: String,
    pub state: JobState,
    /// Set only while AWAITING_RESULT.
    pub remote_token: Option<String>,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    /// Unix timestamp of the last write.
    pub updated_at: i64,
}

impl AnalysisJob {
    /// A freshly (re-)enqueued job.
    pub fn queued(item_id: ItemId, link_mode: &str) -> Self {
        Self {
            item_id,
            link_mode: link_mode.to_string(),
            state: JobState::Queued,
            remote_token: None,
            attempt_count: 0,
            last_error: None,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Returns true while the scheduler still has work to do for this job.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            JobState::Queued | JobState::Submitted | JobState::AwaitingResult
        )
    }

    /// Move to `state`, stamping the write time.
    pub fn transition(&mut self, state: JobState) {
        self.state = state;
        self.updated_at = chrono::Utc::now().timestamp();
    }

    pub fn view(&self) -> JobView {
        JobView {
            id: self.item_id,
            link: self.link_mode.clone(),
        }
    }
}

/// What the queue read views expose for each waiting item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobView {
    pub id: ItemId,
    pub link: String,
}

/// Payload of the remote "analyze" call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub id: ItemId,
    pub content: String,
    pub links: String,
    pub content_language: String,
    pub scope: String,
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The service analyzed the content synchronously.
    Immediate(String),
    /// The result must be fetched later with this token.
    Pending(String),
}

/// Errors from talking to the remote analysis service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote rejected request with status {status}: {body}")]
    RemoteRejected { status: u16, body: String },

    #[error("result not ready (status {status})")]
    NotReady { status: u16 },

    #[error("item {0} no longer exists")]
    InvalidItem(ItemId),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl AnalysisError {
    /// Short label used for metrics and audit entries.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Transport(_) => "transport",
            AnalysisError::RemoteRejected { .. } => "remote_rejected",
            AnalysisError::NotReady { .. } => "not_ready",
            AnalysisError::InvalidItem(_) => "invalid_item",
            AnalysisError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Another tick held the lock; nothing was touched.
    pub skipped: bool,
    /// SUBMITTED records left by an interrupted tick and returned to QUEUED.
    pub recovered: usize,
    /// Jobs moved to AWAITING_RESULT.
    pub submitted: usize,
    /// Jobs that reached SUCCESS.
    pub completed: usize,
    /// Jobs returned to QUEUED after a not-ready poll.
    pub requeued: usize,
    /// Jobs that reached FAILURE.
    pub failed: usize,
    /// Jobs removed because their item vanished.
    pub dropped: usize,
    /// Jobs whose processing hit a store error and were left as they were.
    pub errored: usize,
    /// Jobs re-enqueued while their remote call was in flight; the newer
    /// record was kept.
    pub superseded: usize,
    /// Whether a follow-up tick was armed.
    pub rearmed: bool,
}

impl TickReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Submitted => self.submitted += 1,
            ItemOutcome::Completed => self.completed += 1,
            ItemOutcome::Requeued => self.requeued += 1,
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Dropped => self.dropped += 1,
            ItemOutcome::Errored => self.errored += 1,
            ItemOutcome::Superseded => self.superseded += 1,
        }
    }
}

/// What happened to a single job during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Submitted,
    Completed,
    Requeued,
    Failed,
    Dropped,
    Errored,
    Superseded,
}

impl ItemOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOutcome::Submitted => "submitted",
            ItemOutcome::Completed => "completed",
            ItemOutcome::Requeued => "requeued",
            ItemOutcome::Failed => "failed",
            ItemOutcome::Dropped => "dropped",
            ItemOutcome::Errored => "errored",
            ItemOutcome::Superseded => "superseded",
        }
    }
}
