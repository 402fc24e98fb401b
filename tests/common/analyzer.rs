//! In-process stand-in for the remote analysis service.

use async_trait::async_trait;
use batch_analysis::batch_analysis::{
    AnalysisError, AnalysisRequest, RemoteAnalyzer, SubmitOutcome,
};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays queued responses in order and records every call.
///
/// With nothing queued, submissions are acknowledged as pending (keyed by item
/// id) and polls answer "not ready".
#[derive(Default)]
pub struct ScriptedAnalyzer {
    submit_responses: Mutex<VecDeque<Result<SubmitOutcome, AnalysisError>>>,
    poll_responses: Mutex<VecDeque<Result<String, AnalysisError>>>,
    requests: Mutex<Vec<AnalysisRequest>>,
    polled_tokens: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_submit(&self, response: Result<SubmitOutcome, AnalysisError>) {
        self.submit_responses.lock().unwrap().push_back(response);
    }

    pub fn push_poll(&self, response: Result<String, AnalysisError>) {
        self.poll_responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn polled_tokens(&self) -> Vec<String> {
        self.polled_tokens.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len() + self.polled_tokens.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteAnalyzer for ScriptedAnalyzer {
    async fn submit(&self, request: &AnalysisRequest) -> Result<SubmitOutcome, AnalysisError> {
        self.requests.lock().unwrap().push(request.clone());
        self.submit_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(SubmitOutcome::Pending(request.id.to_string())))
    }

    async fn fetch_result(&self, token: &str) -> Result<String, AnalysisError> {
        self.polled_tokens.lock().unwrap().push(token.to_string());
        self.poll_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AnalysisError::NotReady { status: 404 }))
    }
}
