//! Fake analysis service
//!
//! Serves `POST /analyze` and `GET /query/{token}` from scripted responses on a
//! random local port, recording what the client sent. When dropped, the server
//! shuts down gracefully.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// A canned HTTP response.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub body: String,
}

#[allow(dead_code)]
impl ScriptedResponse {
    pub fn ok(body: &str) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, self.body).into_response()
    }
}

#[derive(Default)]
struct FakeState {
    analyze_responses: Mutex<VecDeque<ScriptedResponse>>,
    query_responses: Mutex<VecDeque<ScriptedResponse>>,
    analyze_bodies: Mutex<Vec<serde_json::Value>>,
    queried_tokens: Mutex<Vec<String>>,
    authorization: Mutex<Vec<Option<String>>>,
}

impl FakeState {
    fn remember_auth(&self, headers: &HeaderMap) {
        let value = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        self.authorization.lock().unwrap().push(value);
    }
}

async fn analyze(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    state.remember_auth(&headers);
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    state.analyze_bodies.lock().unwrap().push(json);
    state
        .analyze_responses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| ScriptedResponse::ok(""))
        .into_response()
}

async fn query(
    State(state): State<Arc<FakeState>>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> axum::response::Response {
    state.remember_auth(&headers);
    state.queried_tokens.lock().unwrap().push(token);
    state
        .query_responses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| ScriptedResponse::with_status(404, ""))
        .into_response()
}

pub struct FakeAnalysisServer {
    /// Base URL for the client (e.g., "http://127.0.0.1:12345")
    pub base_url: String,
    state: Arc<FakeState>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

#[allow(dead_code)]
impl FakeAnalysisServer {
    /// Spawns the server on a random port.
    ///
    /// The listener is bound before returning, so requests can be made
    /// immediately.
    pub async fn spawn() -> Self {
        let state = Arc::new(FakeState::default());
        let app = Router::new()
            .route("/analyze", post(analyze))
            .route("/query/{token}", get(query))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            state,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn push_analyze(&self, response: ScriptedResponse) {
        self.state
            .analyze_responses
            .lock()
            .unwrap()
            .push_back(response);
    }

    pub fn push_query(&self, response: ScriptedResponse) {
        self.state.query_responses.lock().unwrap().push_back(response);
    }

    pub fn analyze_bodies(&self) -> Vec<serde_json::Value> {
        self.state.analyze_bodies.lock().unwrap().clone()
    }

    pub fn queried_tokens(&self) -> Vec<String> {
        self.state.queried_tokens.lock().unwrap().clone()
    }

    pub fn authorization_headers(&self) -> Vec<Option<String>> {
        self.state.authorization.lock().unwrap().clone()
    }
}

impl Drop for FakeAnalysisServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
