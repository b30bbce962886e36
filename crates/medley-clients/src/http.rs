//! Shared HTTP plumbing for the adapters.
//!
//! Every adapter owns an [`Http`] holding a clone of the process-wide
//! `reqwest::Client` plus its own rate limiter, so one slow or chatty server
//! cannot starve the others.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::{Quota, RateLimiter};
use medley_core::config::ClientsConfig;
use medley_core::{Error, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

type Limiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Build the shared outbound client.
pub fn build_http_client(config: &ClientsConfig) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
        .user_agent(concat!("medley/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client with timeout: {}", e);
            Client::new()
        })
}

#[derive(Clone)]
pub(crate) struct Http {
    client: Client,
    base_url: String,
    label: &'static str,
    limiter: Arc<Limiter>,
}

impl Http {
    pub(crate) fn new(client: Client, base_url: &str, label: &'static str, per_second: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(per_second.max(1)).unwrap_or(NonZeroU32::MIN));
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            label,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path))
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path))
    }

    pub(crate) fn put(&self, path: &str) -> RequestBuilder {
        self.client.put(self.url(path))
    }

    pub(crate) fn delete(&self, path: &str) -> RequestBuilder {
        self.client.delete(self.url(path))
    }

    /// Send a request, waiting for the rate limiter first.
    ///
    /// Non-2xx responses become errors: 404 maps to `NotFound`, everything
    /// else to `Upstream` with the status and body.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.limiter.until_ready().await;

        let started = Instant::now();
        let result = request.send().await;
        metrics::histogram!("medley_client_request_duration_seconds", "client_type" => self.label)
            .record(started.elapsed().as_secs_f64());

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                metrics::counter!("medley_client_requests_total", "client_type" => self.label, "outcome" => "transport_error")
                    .increment(1);
                return Err(Error::upstream(self.label, format!("request failed: {e}")));
            }
        };

        let status = resp.status();
        let outcome = if status.is_success() { "ok" } else { "http_error" };
        metrics::counter!("medley_client_requests_total", "client_type" => self.label, "outcome" => outcome)
            .increment(1);

        if status.is_success() {
            return Ok(resp);
        }

        let path = resp.url().path().to_string();
        let body = resp.text().await.unwrap_or_default();
        tracing::debug!(client = self.label, %status, %path, "Upstream returned an error status");
        Err(match status {
            StatusCode::NOT_FOUND => Error::not_found(format!("{} resource", self.label), path),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Error::upstream(self.label, format!("{status}: credentials rejected"))
            }
            _ => Error::upstream(self.label, format!("{status}: {}", truncate(&body, 200))),
        })
    }

    /// Send and decode a JSON body.
    pub(crate) async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let resp = self.send(request).await?;
        resp.json::<T>()
            .await
            .map_err(|e| Error::upstream(self.label, format!("parse error: {e}")))
    }

    /// Send and discard the body.
    pub(crate) async fn execute(&self, request: RequestBuilder) -> Result<()> {
        self.send(request).await.map(|_| ())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
