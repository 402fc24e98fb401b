//! Client for the remote text-analysis service.
//!
//! The service exposes two endpoints:
//! - `POST {base}/analyze` accepting an [`AnalysisRequest`] and answering with
//!   either the analyzed content or a token for later retrieval
//! - `GET {base}/query/{token}` answering 200 with the analyzed content once
//!   it is ready

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::debug;

use super::models::{AnalysisError, AnalysisRequest, SubmitOutcome};

/// The remote analysis service as seen by the batch processor.
#[async_trait]
pub trait RemoteAnalyzer: Send + Sync {
    /// Submit content for analysis.
    async fn submit(&self, request: &AnalysisRequest) -> Result<SubmitOutcome, AnalysisError>;

    /// Fetch the result of an earlier submission.
    ///
    /// Any non-200 status is reported as [`AnalysisError::NotReady`].
    async fn fetch_result(&self, token: &str) -> Result<String, AnalysisError>;
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    content: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    content: String,
}

/// reqwest-based [`RemoteAnalyzer`].
#[derive(Clone)]
pub struct HttpRemoteAnalyzer {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRemoteAnalyzer {
    /// # Arguments
    /// * `base_url` - Base URL of the analysis service (e.g., "http://localhost:8080")
    /// * `api_key` - Sent as a bearer token when present
    /// * `timeout_secs` - Request timeout in seconds
    pub fn new(base_url: String, api_key: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, AnalysisError> {
        #[cfg(feature = "slowdown")]
        random_slowdown().await;

        self.authorize(builder)
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))
    }

    async fn body_text(response: Response) -> Result<String, AnalysisError> {
        response
            .text()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))
    }
}

#[async_trait]
impl RemoteAnalyzer for HttpRemoteAnalyzer {
    async fn submit(&self, request: &AnalysisRequest) -> Result<SubmitOutcome, AnalysisError> {
        let url = format!("{}/analyze", self.base_url);
        let response = self.send(self.client.post(&url).json(request)).await?;

        let status = response.status();
        let body = Self::body_text(response).await?;
        if !status.is_success() {
            return Err(AnalysisError::RemoteRejected {
                status: status.as_u16(),
                body,
            });
        }

        // An empty acknowledgement means the service keyed the job by item id.
        if body.trim().is_empty() {
            return Ok(SubmitOutcome::Pending(request.id.to_string()));
        }

        let parsed: AnalyzeResponse = serde_json::from_str(&body)
            .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;
        match (parsed.content, parsed.token) {
            (Some(content), _) => Ok(SubmitOutcome::Immediate(content)),
            (None, Some(token)) if !token.is_empty() => Ok(SubmitOutcome::Pending(token)),
            _ => Ok(SubmitOutcome::Pending(request.id.to_string())),
        }
    }

    async fn fetch_result(&self, token: &str) -> Result<String, AnalysisError> {
        let url = format!("{}/query/{}", self.base_url, urlencoding::encode(token));
        let response = self.send(self.client.get(&url)).await?;

        let status = response.status();
        if status.as_u16() != 200 {
            debug!("Result for token {} not ready: {}", token, status);
            return Err(AnalysisError::NotReady {
                status: status.as_u16(),
            });
        }

        let body = Self::body_text(response).await?;
        let parsed: QueryResponse = serde_json::from_str(&body)
            .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;
        Ok(parsed.content)
    }
}

/// Waits a random amount of time in front of each remote call.
#[cfg(feature = "slowdown")]
async fn random_slowdown() {
    use rand::Rng;

    let millis = rand::rng().random_range(0..2000u64);
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
