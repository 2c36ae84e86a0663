//! In-process Home Assistant stand-in used by the handler and client tests.
//!
//! Serves `/api/states`, `/api/states/{entity_id}` and
//! `/api/services/{domain}/{service}` from a fixed entity list, and records
//! every request it receives.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::client::HassClient;

pub const TOKEN: &str = "test-token";

/// One request as seen by the mock.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<Value>,
}

#[derive(Clone, Copy)]
enum Behavior {
    Normal,
    Status(u16),
    Garbled,
    Stall,
}

#[derive(Clone)]
struct MockState {
    states: Arc<Vec<Value>>,
    behavior: Behavior,
    log: Arc<Mutex<Vec<Recorded>>>,
}

pub struct MockHass {
    pub url: String,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl MockHass {
    /// Serve the given entity states.
    pub async fn start(states: Vec<Value>) -> Self {
        Self::spawn(states, Behavior::Normal).await
    }

    /// Answer every request with an empty body and `status`.
    pub async fn with_status(status: u16) -> Self {
        Self::spawn(vec![], Behavior::Status(status)).await
    }

    /// Answer every request with `200 OK` and a body that is not JSON.
    pub async fn garbled() -> Self {
        Self::spawn(vec![], Behavior::Garbled).await
    }

    /// Hold every request open for longer than any test timeout.
    pub async fn stalled() -> Self {
        Self::spawn(vec![], Behavior::Stall).await
    }

    async fn spawn(states: Vec<Value>, behavior: Behavior) -> Self {
        let log = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            states: Arc::new(states),
            behavior,
            log: log.clone(),
        };
        let app = Router::new().fallback(handle).with_state(state);
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            url: format!("http://{addr}"),
            log,
        }
    }

    /// A client pointed at this mock with the expected token.
    pub fn client(&self) -> HassClient {
        HassClient::new(&self.url, TOKEN.into(), Duration::from_secs(5)).unwrap()
    }

    pub async fn requests(&self) -> Vec<Recorded> {
        self.log.lock().await.clone()
    }
}

/// A URL on localhost where nothing is listening.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

async fn handle(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let authorization = header_str(&headers, header::AUTHORIZATION);
    state.log.lock().await.push(Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        authorization: authorization.clone(),
        content_type: header_str(&headers, header::CONTENT_TYPE),
        body: serde_json::from_str(&body).ok(),
    });

    match state.behavior {
        Behavior::Normal => {}
        Behavior::Status(code) => {
            return StatusCode::from_u16(code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
        Behavior::Garbled => return (StatusCode::OK, "<html>not json</html>").into_response(),
        Behavior::Stall => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            return StatusCode::OK.into_response();
        }
    }

    if authorization.as_deref() != Some(format!("Bearer {TOKEN}").as_str()) {
        return (StatusCode::UNAUTHORIZED, "401: Unauthorized").into_response();
    }

    let path = uri.path();
    if method == Method::GET && path == "/api/states" {
        return Json(state.states.as_ref().clone()).into_response();
    }
    if method == Method::GET {
        if let Some(entity_id) = path.strip_prefix("/api/states/") {
            return match state
                .states
                .iter()
                .find(|s| s["entity_id"].as_str() == Some(entity_id))
            {
                Some(found) => Json(found.clone()).into_response(),
                None => (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "message": "Entity not found." })),
                )
                    .into_response(),
            };
        }
    }
    if method == Method::POST && path.starts_with("/api/services/") {
        return Json(json!([])).into_response();
    }
    StatusCode::NOT_FOUND.into_response()
}
