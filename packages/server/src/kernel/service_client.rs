//! Resilient HTTP client for calls to collaborator services.
//!
//! Every call gets a per-attempt timeout. Network failures, 5xx and 429 are
//! retried with exponential backoff; other 4xx answers fail immediately.

use anyhow::Context;
use rand::Rng;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::HttpClientConfig;

#[derive(Debug, Error)]
pub enum ServiceClientError {
    /// Network failure, timeout or throttling persisted through every retry.
    #[error("{service} unavailable after {attempts} attempts: {message}")]
    Unavailable {
        service: String,
        attempts: u32,
        message: String,
    },

    /// The collaborator kept answering 5xx.
    #[error("{service} failed with status {status}: {body}")]
    Upstream {
        service: String,
        status: u16,
        body: String,
    },

    /// The collaborator rejected the request (4xx other than 429).
    #[error("{service} rejected request with status {status}: {body}")]
    Rejected {
        service: String,
        status: u16,
        body: String,
    },

    #[error("{service} returned an unreadable response: {message}")]
    Decode { service: String, message: String },
}

impl ServiceClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Rejected { status, .. } if *status == StatusCode::NOT_FOUND.as_u16())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } | Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

enum Attempt {
    Done(String),
    Retry(String, Option<u16>),
    Fail(ServiceClientError),
}

/// HTTP client bound to one collaborator's base URL.
#[derive(Clone)]
pub struct ServiceClient {
    service: String,
    base_url: String,
    http: reqwest::Client,
    policy: HttpClientConfig,
}

impl ServiceClient {
    pub fn new(
        service: impl Into<String>,
        base_url: impl Into<String>,
        policy: HttpClientConfig,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(policy.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            service: service.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            policy,
        })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer: Option<&str>,
    ) -> Result<T, ServiceClientError> {
        let body = self.send::<()>(Method::GET, path, None, bearer).await?;
        self.decode(&body)
    }

    /// POST where only the status matters.
    pub async fn post<B: Serialize>(
        &self,
        path: &str,
        payload: &B,
        bearer: Option<&str>,
    ) -> Result<(), ServiceClientError> {
        self.send(Method::POST, path, Some(payload), bearer)
            .await
            .map(|_| ())
    }

    fn decode<T: DeserializeOwned>(&self, body: &str) -> Result<T, ServiceClientError> {
        serde_json::from_str(body).map_err(|e| ServiceClientError::Decode {
            service: self.service.clone(),
            message: e.to_string(),
        })
    }

    /// Delay before retry number `retry` (0-based), capped and jittered.
    pub fn backoff(&self, retry: u32) -> Duration {
        let base = self.policy.retry_base_delay.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << retry.min(16));
        let capped = exp.min(self.policy.retry_max_delay.as_millis() as u64);
        let jitter = if capped >= 10 {
            rand::thread_rng().gen_range(0..=capped / 10)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        payload: Option<&B>,
        bearer: Option<&str>,
    ) -> Result<String, ServiceClientError> {
        let url = format!("{}{}", self.base_url, path);
        let attempts = self.policy.max_retries + 1;
        let mut last_error = String::new();
        let mut last_status = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.backoff(attempt - 1);
                debug!(
                    service = %self.service,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying collaborator call"
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt(method.clone(), &url, payload, bearer).await {
                Attempt::Done(body) => return Ok(body),
                Attempt::Fail(e) => return Err(e),
                Attempt::Retry(message, status) => {
                    warn!(
                        service = %self.service,
                        url = %url,
                        attempt = attempt + 1,
                        error = %message,
                        "Collaborator call failed"
                    );
                    last_error = message;
                    last_status = status;
                }
            }
        }

        Err(match last_status {
            Some(status) if status >= 500 => ServiceClientError::Upstream {
                service: self.service.clone(),
                status,
                body: last_error,
            },
            _ => ServiceClientError::Unavailable {
                service: self.service.clone(),
                attempts,
                message: last_error,
            },
        })
    }

    async fn attempt<B: Serialize>(
        &self,
        method: Method,
        url: &str,
        payload: Option<&B>,
        bearer: Option<&str>,
    ) -> Attempt {
        let mut request = self.http.request(method, url);
        if let Some(payload) = payload {
            request = request.json(payload);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(e.to_string(), None),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Attempt::Retry(e.to_string(), None),
        };

        if status.is_success() {
            Attempt::Done(body)
        } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Attempt::Retry(format!("status {}: {}", status.as_u16(), body), Some(status.as_u16()))
        } else {
            Attempt::Fail(ServiceClientError::Rejected {
                service: self.service.clone(),
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode as AxumStatus, routing::get, Json, Router};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_millis(500),
            max_retries,
            retry_base_delay: Duration::from_millis(5),
            retry_max_delay: Duration::from_millis(20),
        }
    }

    /// Serve `router` on an ephemeral port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Fails with `status` for the first `failures` calls, then succeeds.
    fn flaky_router(failures: u32, status: AxumStatus, hits: Arc<AtomicU32>) -> Router {
        Router::new()
            .route(
                "/thing",
                get(|State((hits, failures, status)): State<(Arc<AtomicU32>, u32, AxumStatus)>| async move {
                    let n = hits.fetch_add(1, Ordering::SeqCst);
                    if n < failures {
                        (status, Json(serde_json::json!({"error": "nope"})))
                    } else {
                        (AxumStatus::OK, Json(serde_json::json!({"value": 42})))
                    }
                }),
            )
            .with_state((hits, failures, status))
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let hits = Arc::new(AtomicU32::new(0));
        let url = serve(flaky_router(2, AxumStatus::SERVICE_UNAVAILABLE, hits.clone())).await;
        let client = ServiceClient::new("catalog", url, fast_policy(3)).unwrap();

        let value: serde_json::Value = client.get_json("/thing", None).await.unwrap();

        assert_eq!(value["value"], 42);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_throttling() {
        let hits = Arc::new(AtomicU32::new(0));
        let url = serve(flaky_router(1, AxumStatus::TOO_MANY_REQUESTS, hits.clone())).await;
        let client = ServiceClient::new("catalog", url, fast_policy(3)).unwrap();

        let result: Result<serde_json::Value, _> = client.get_json("/thing", None).await;

        assert!(result.is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let hits = Arc::new(AtomicU32::new(0));
        let url = serve(flaky_router(10, AxumStatus::NOT_FOUND, hits.clone())).await;
        let client = ServiceClient::new("catalog", url, fast_policy(3)).unwrap();

        let err = client
            .get_json::<serde_json::Value>("/thing", None)
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_persistent_server_error_maps_to_upstream() {
        let hits = Arc::new(AtomicU32::new(0));
        let url = serve(flaky_router(10, AxumStatus::INTERNAL_SERVER_ERROR, hits.clone())).await;
        let client = ServiceClient::new("catalog", url, fast_policy(2)).unwrap();

        let err = client
            .get_json::<serde_json::Value>("/thing", None)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceClientError::Upstream { status: 500, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ServiceClient::new("catalog", format!("http://{}", addr), fast_policy(1)).unwrap();
        let err = client
            .get_json::<serde_json::Value>("/thing", None)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceClientError::Unavailable { attempts: 2, .. }));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let client = ServiceClient::new(
            "catalog",
            "http://localhost",
            HttpClientConfig {
                timeout: Duration::from_secs(1),
                max_retries: 5,
                retry_base_delay: Duration::from_millis(100),
                retry_max_delay: Duration::from_millis(1000),
            },
        )
        .unwrap();

        let first = client.backoff(0).as_millis();
        let third = client.backoff(2).as_millis();
        let tenth = client.backoff(9).as_millis();

        assert!((100..=110).contains(&first));
        assert!((400..=440).contains(&third));
        assert!((1000..=1100).contains(&tenth));
    }
}
