//! HTTP fetcher shared by every source adapter.
//!
//! Wraps a single `reqwest::Client` with a bounded exponential-backoff retry
//! loop. Transient failures (connect/timeout/body errors, 5xx, 429) are
//! retried; every other HTTP status fails on the first attempt.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, warn};

use jobradar_shared::{HttpConfig, JobRadarError, Result, RetryPolicy};

/// Fallback User-Agent when config leaves it blank.
const USER_AGENT: &str = concat!("JobRadar/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Retrying HTTP client. Cheap to share behind an `Arc`.
pub struct Fetcher {
    client: Client,
    retry: RetryPolicy,
}

impl Fetcher {
    /// Build a fetcher from the `[http]` config section.
    pub fn new(http: &HttpConfig) -> Result<Self> {
        let user_agent = if http.user_agent.trim().is_empty() {
            USER_AGENT
        } else {
            http.user_agent.as_str()
        };

        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(http.timeout_secs.max(1)))
            .build()
            .map_err(|e| JobRadarError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            retry: RetryPolicy::from(http),
        })
    }

    /// Override the retry policy (tests use zero delays).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// GET `url` and decode the body as JSON.
    pub async fn get_json(&self, url: &str) -> Result<Value> {
        let body = self
            .send_with_retry(url, || {
                self.client
                    .get(url)
                    .header(reqwest::header::ACCEPT, "application/json")
            })
            .await?;
        decode_json(url, &body)
    }

    /// GET `url` and return the body as text (HTML listing pages).
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.send_with_retry(url, || {
            self.client
                .get(url)
                .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
        })
        .await
    }

    /// POST a JSON body to `url` and decode the JSON response.
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let text = self
            .send_with_retry(url, || {
                self.client
                    .post(url)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .json(body)
            })
            .await?;
        decode_json(url, &text)
    }

    /// Send the request built by `build`, retrying transient failures.
    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<String>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u32 = 1;
        loop {
            match send_once(url, build()).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(%url, attempt, error = %e, "fetch failed");
                    return Err(e);
                }
            }
        }
    }
}

/// One request/response cycle: status check and body read.
async fn send_once(url: &str, request: RequestBuilder) -> Result<String> {
    debug!(%url, "fetching");

    let response = request
        .send()
        .await
        .map_err(|e| JobRadarError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(JobRadarError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response
        .text()
        .await
        .map_err(|e| JobRadarError::Network(format!("{url}: body read failed: {e}")))
}

fn decode_json(url: &str, body: &str) -> Result<Value> {
    serde_json::from_str(body)
        .map_err(|e| JobRadarError::parse(format!("{url}: invalid JSON response: {e}")))
}
