// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Injected HTTP fetch capability used by the JWKS cache.
//!
//! The cache only ever issues `GET` requests with a bearer credential, so the
//! request shape is kept minimal. [`ReqwestFetch`] is the production
//! implementation; tests substitute in-process fakes.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;

/// Default request timeout for the reqwest client.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Response as seen by the cache.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Fetch failures below the HTTP status level.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// HTTP fetch capability.
#[async_trait]
pub trait Fetch: Send + Sync + 'static {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed [`Fetch`].
#[derive(Debug, Clone)]
pub struct ReqwestFetch {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestFetch {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "auth.fetch", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });
        Self { client, timeout }
    }
}

impl Default for ReqwestFetch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetch for ReqwestFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?
            .to_vec();

        Ok(FetchResponse {
            status,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reqwest_fetch_forwards_headers_and_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/jwks"))
            .and(header("authorization", "Bearer sk_test_abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"keys":[]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let response = ReqwestFetch::new()
            .fetch(
                FetchRequest::get(format!("{}/v1/jwks", server.uri()))
                    .header("Authorization", "Bearer sk_test_abc"),
            )
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, br#"{"keys":[]}"#);
    }

    #[tokio::test]
    async fn reqwest_fetch_passes_error_statuses_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let response = ReqwestFetch::new()
            .fetch(FetchRequest::get(server.uri()))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn reqwest_fetch_reports_transport_failures() {
        // Nothing listens on port 9 (discard) in the test environment.
        let result = ReqwestFetch::with_timeout(Duration::from_secs(2))
            .fetch(FetchRequest::get("http://127.0.0.1:9/v1/jwks"))
            .await;
        assert!(matches!(
            result,
            Err(FetchError::Transport(_)) | Err(FetchError::Timeout(_))
        ));
    }
}
