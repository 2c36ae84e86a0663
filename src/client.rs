//! HTTP client for the Home Assistant REST API.
//!
//! [`HassClient`] wraps `reqwest::Client` and provides one method per
//! endpoint the tools use. Entity payloads are returned as `serde_json`
//! values; the tools layer reshapes them for the caller.
//!
//! ## Authentication
//!
//! Every request carries the long-lived access token as a Bearer token, plus
//! `Content-Type: application/json`.
//!
//! ## URLs
//!
//! Caller-supplied ids are pushed as single percent-encoded path segments,
//! so `/`, `?`, `#` and `..` in an entity id cannot address another endpoint.
//!
//! ## Error handling
//!
//! Only `200 OK` counts as success. Any other status becomes
//! [`ClientError::Api`] without reading the body.

use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// A raw entity state object as returned by `/api/states`.
pub type EntityState = Map<String, Value>;

/// HTTP client for a single Home Assistant instance.
pub struct HassClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HassClient {
    /// Create a client for the instance at `base_url`.
    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self, ClientError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()?;
        // Strip trailing slash for consistent URL construction
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// The instance base URL (without trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /api/states/{entity_id}` - current state of one entity.
    pub async fn get_state(&self, entity_id: &str) -> Result<Value, ClientError> {
        let resp = self
            .http
            .get(self.endpoint(&["api", "states", entity_id])?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::read_json(Self::check_status(resp)?).await
    }

    /// `GET /api/states` - every entity known to the instance.
    pub async fn list_states(&self) -> Result<Vec<EntityState>, ClientError> {
        let resp = self
            .http
            .get(self.endpoint(&["api", "states"])?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::read_json(Self::check_status(resp)?).await
    }

    /// `POST /api/services/{domain}/{service}` - call a service. The response
    /// body (the list of changed states) is not read.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        body: &Value,
    ) -> Result<(), ClientError> {
        let resp = self
            .http
            .post(self.endpoint(&["api", "services", domain, service])?)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Self::check_status(resp)?;
        Ok(())
    }

    /// Append `segments` to the base URL, each encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let invalid = || ClientError::Protocol(format!("Invalid base URL: {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = resp.status();
        if status == StatusCode::OK {
            Ok(resp)
        } else {
            Err(ClientError::Api {
                status: status.as_u16(),
            })
        }
    }

    async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            ClientError::Protocol(format!("invalid JSON from Home Assistant: {e}"))
        })
    }
}

/// Errors returned by [`HassClient`] methods.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP transport error (connection refused, timeout, DNS failure, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Home Assistant answered with a status other than `200 OK`.
    #[error("Home Assistant returned HTTP {status}")]
    Api { status: u16 },

    /// The response body was not the JSON shape we expected.
    #[error("{0}")]
    Protocol(String),
}
