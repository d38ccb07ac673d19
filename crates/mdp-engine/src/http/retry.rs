//! Retrying HTTP invoker
//!
//! Wraps a single outbound call with classified retries: 429 and 5xx are
//! retryable (sleeping per `Retry-After` when the server provides one,
//! otherwise capped exponential backoff); any other 4xx is terminal and
//! fails immediately. Exhausting the attempt budget surfaces as a
//! `TransientNetwork` error carrying the last status and attempt count.

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{EngineResult, PipelineError};

/// Maximum response body length carried in error messages
const ERROR_BODY_SNIPPET_LEN: usize = 512;

/// Retry/backoff policy for one outbound call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// First backoff delay; doubles per attempt
    pub backoff_base_secs: u64,
    /// Ceiling on any single backoff sleep
    pub backoff_cap_secs: u64,
    /// Status codes retried with backoff; everything else in 4xx is terminal
    pub retryable_status_codes: Vec<u16>,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 2;
    pub const DEFAULT_BACKOFF_CAP_SECS: u64 = 60;

    /// Rate limiting plus every server-side status.
    pub fn default_retryable_status_codes() -> Vec<u16> {
        std::iter::once(429).chain(500..600).collect()
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// Backoff delay before the attempt following `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let secs = self
            .backoff_base_secs
            .saturating_mul(1u64 << exp)
            .min(self.backoff_cap_secs);
        Duration::from_secs(secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            backoff_base_secs: Self::DEFAULT_BACKOFF_BASE_SECS,
            backoff_cap_secs: Self::DEFAULT_BACKOFF_CAP_SECS,
            retryable_status_codes: Self::default_retryable_status_codes(),
        }
    }
}

/// A rebuildable description of one HTTP request
///
/// The invoker constructs a fresh `reqwest` request from this on every
/// attempt, so retries never reuse a consumed builder. `params` is the
/// query-parameter object that later lands (sanitized) on the audit row.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub params: serde_json::Value,
    pub body: Option<serde_json::Value>,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            params: serde_json::Value::Null,
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A completed HTTP exchange with its timing
#[derive(Debug, Clone)]
pub struct InvokeResponse {
    pub status: u16,
    pub body: String,
    /// When the request left this process
    pub sent_at: DateTime<Utc>,
    /// When response headers arrived
    pub response_at: DateTime<Utc>,
    /// When the body was fully read
    pub received_at: DateTime<Utc>,
}

impl InvokeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> EngineResult<serde_json::Value> {
        serde_json::from_str(&self.body).map_err(|e| {
            PipelineError::RemoteJob(format!("response body is not valid JSON: {}", e))
        })
    }
}

/// Invoker wrapping one outbound call with classified retry/backoff
///
/// Holds no mutable state; concurrent invocations share only the pooled
/// `reqwest` client.
#[derive(Debug, Clone)]
pub struct RetryingInvoker {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl RetryingInvoker {
    pub fn new(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Build an invoker with a pooled client from engine configuration
    pub fn from_config(config: &crate::config::EngineConfig) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http.timeout_secs))
            .user_agent(config.http.user_agent.clone())
            .build()
            .map_err(|e| PipelineError::Configuration(format!("http client: {e}")))?;
        Ok(Self::new(client, config.retry.clone()))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute the request, retrying per policy
    ///
    /// Returns `Ok` only for a 2xx exchange. Terminal 4xx returns
    /// `PipelineError::Http` without retrying; exhausted retries return
    /// `PipelineError::TransientNetwork`.
    pub async fn invoke(&self, spec: &RequestSpec) -> EngineResult<InvokeResponse> {
        let mut last_status: u16 = 0;

        for attempt in 1..=self.policy.max_attempts {
            let sent_at = Utc::now();

            debug!(
                method = %spec.method,
                url = %spec.url,
                attempt = attempt,
                "Sending request"
            );

            match self.send(spec).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let response_at = Utc::now();
                    let retry_after = retry_after_secs(
                        response
                            .headers()
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok()),
                    );
                    let body = match response.text().await {
                        Ok(body) => body,
                        Err(e) => {
                            // Body read failures are transport errors: retryable.
                            last_status = status;
                            warn!(
                                url = %spec.url,
                                status = status,
                                attempt = attempt,
                                error = %e,
                                "Failed to read response body"
                            );
                            self.backoff(attempt, None).await;
                            continue;
                        }
                    };

                    if (200..300).contains(&status) {
                        debug!(url = %spec.url, status = status, attempt = attempt, "Request succeeded");
                        return Ok(InvokeResponse {
                            status,
                            body,
                            sent_at,
                            response_at,
                            received_at: Utc::now(),
                        });
                    }

                    if self.policy.is_retryable(status) {
                        last_status = status;
                        warn!(
                            url = %spec.url,
                            status = status,
                            attempt = attempt,
                            max_attempts = self.policy.max_attempts,
                            retry_after_secs = ?retry_after.map(|d| d.as_secs()),
                            "Retryable HTTP failure"
                        );
                        self.backoff(attempt, retry_after).await;
                        continue;
                    }

                    // Any other 4xx is terminal: no retry.
                    warn!(url = %spec.url, status = status, "Terminal HTTP failure");
                    return Err(PipelineError::Http {
                        status,
                        message: snippet(&body),
                    });
                }
                Err(e) => {
                    warn!(
                        url = %spec.url,
                        attempt = attempt,
                        error = %e,
                        "Request transport error"
                    );
                    self.backoff(attempt, None).await;
                }
            }
        }

        Err(PipelineError::TransientNetwork {
            status: last_status,
            attempts: self.policy.max_attempts,
        })
    }

    async fn send(&self, spec: &RequestSpec) -> Result<reqwest::Response, reqwest::Error> {
        let mut builder = self.client.request(spec.method.clone(), &spec.url);

        for (name, value) in &spec.headers {
            builder = builder.header(name, value);
        }
        if let Some(params) = spec.params.as_object() {
            if !params.is_empty() {
                builder = builder.query(params);
            }
        }
        if let Some(ref body) = spec.body {
            builder = builder.json(body);
        }

        builder.send().await
    }

    /// Sleep before the next attempt; no-op after the last one.
    async fn backoff(&self, attempt: u32, server_hint: Option<Duration>) {
        if attempt >= self.policy.max_attempts {
            return;
        }
        let wait = server_hint.unwrap_or_else(|| self.policy.backoff_delay(attempt));
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

/// Parse a `Retry-After` header value given in whole seconds.
fn retry_after_secs(header: Option<&str>) -> Option<Duration> {
    header
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn snippet(body: &str) -> String {
    if body.len() <= ERROR_BODY_SNIPPET_LEN {
        body.to_string()
    } else {
        let mut end = ERROR_BODY_SNIPPET_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_base_secs: 0,
            backoff_cap_secs: 0,
            ..RetryPolicy::default()
        }
    }

    fn invoker(policy: RetryPolicy) -> RetryingInvoker {
        RetryingInvoker::new(reqwest::Client::new(), policy)
    }

    #[test]
    fn test_backoff_schedule_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            backoff_base_secs: 2,
            backoff_cap_secs: 60,
            ..RetryPolicy::default()
        };
        let delays: Vec<u64> = (1..=6).map(|a| policy.backoff_delay(a).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32, 60]);
    }

    #[test]
    fn test_default_retryable_set_is_429_and_5xx() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable(429));
        assert!(policy.is_retryable(500));
        assert!(policy.is_retryable(503));
        assert!(policy.is_retryable(599));
        assert!(!policy.is_retryable(400));
        assert!(!policy.is_retryable(404));
        assert!(!policy.is_retryable(200));
    }

    #[test]
    fn test_custom_retryable_set_is_honored() {
        let policy = RetryPolicy {
            retryable_status_codes: vec![429],
            ..RetryPolicy::default()
        };
        assert!(policy.is_retryable(429));
        assert!(!policy.is_retryable(503));
    }

    #[test]
    fn test_retry_after_parsing() {
        assert_eq!(retry_after_secs(Some("5")), Some(Duration::from_secs(5)));
        assert_eq!(retry_after_secs(Some(" 12 ")), Some(Duration::from_secs(12)));
        assert_eq!(retry_after_secs(Some("not-a-number")), None);
        assert_eq!(retry_after_secs(None), None);
    }

    #[tokio::test]
    async fn test_permanent_429_makes_exactly_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/report"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let spec = RequestSpec::new(Method::GET, format!("{}/report", server.uri()));
        let err = invoker(fast_policy(3)).invoke(&spec).await.unwrap_err();

        match err {
            PipelineError::TransientNetwork { status, attempts } => {
                assert_eq!(status, 429);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected TransientNetwork, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_terminal_4xx_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/report"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad params"))
            .expect(1)
            .mount(&server)
            .await;

        let spec = RequestSpec::new(Method::POST, format!("{}/report", server.uri()));
        let err = invoker(fast_policy(3)).invoke(&spec).await.unwrap_err();

        match err {
            PipelineError::Http { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad params");
            }
            other => panic!("expected Http, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_5xx_then_success_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let spec = RequestSpec::new(Method::GET, format!("{}/flaky", server.uri()));
        let response = invoker(fast_policy(3)).invoke(&spec).await.unwrap();

        assert!(response.is_success());
        assert_eq!(response.json().unwrap()["ok"], true);
        assert!(response.received_at >= response.sent_at);
    }

    #[tokio::test]
    async fn test_success_carries_body_and_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/echo"))
            .and(wiremock::matchers::query_param("tenant", "t-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        let spec = RequestSpec::new(Method::GET, format!("{}/echo", server.uri()))
            .with_params(serde_json::json!({"tenant": "t-1"}));
        let response = invoker(fast_policy(1)).invoke(&spec).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "[]");
    }
}
