//! Request execution with bounded retries
//!
//! # Pass-through policy
//! A response that completes is a result, whatever its status. 4xx/5xx
//! bodies are handed back in a [`ResponseEnvelope`] so the caller can surface
//! the upstream diagnostic verbatim. Only failures to get a response at all
//! (connection errors, timeouts) are retried, plus any status the
//! [`RetryPolicy`] explicitly opts in.

use std::time::{Duration, Instant};

use reqwest::Client;

use crate::error::{ClientError, Result};
use crate::request::OutboundRequest;
use crate::response::ResponseEnvelope;
use crate::utils::log_sanitizer::truncate_for_log;

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default per-attempt request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway statuses produced by proxies in front of the API rather than by the API itself.
pub const GATEWAY_STATUSES: [u16; 3] = [502, 503, 504];

/// Retry configuration for [`Transport`].
///
/// Backoff: `base_delay * 2^attempt`, capped at `max_delay`. No new attempt
/// starts once `max_elapsed` would be exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Upper bound for the time spent across all attempts and delays.
    pub max_elapsed: Duration,
    /// HTTP statuses that are retried. Empty means transport failures only.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_elapsed: Duration::from_secs(120),
            retryable_statuses: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// A policy that sends each request exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set the total number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set base and maximum backoff delay.
    #[must_use]
    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Set the overall time budget.
    #[must_use]
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    /// Also retry [`GATEWAY_STATUSES`].
    #[must_use]
    pub fn with_gateway_retries(mut self) -> Self {
        for status in GATEWAY_STATUSES {
            if !self.retryable_statuses.contains(&status) {
                self.retryable_statuses.push(status);
            }
        }
        self
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    fn retries_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Delay before retry number `attempt + 1`.
    ///
    /// 100ms, 200ms, 400ms, ... with the defaults, never above `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let capped_attempt = attempt.min(20); // Prevent 2^attempt from overflowing
        self.base_delay
            .saturating_mul(1_u32 << capped_attempt)
            .min(self.max_delay)
    }
}

/// Outcome of one attempt that did not produce a usable response.
enum AttemptError {
    /// Worth another attempt.
    Retryable(String),
    /// The request cannot be sent as built.
    Fatal(String),
}

/// Create an HTTP client with explicit timeouts.
pub fn create_http_client(connect_timeout: Duration, request_timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()
        .map_err(|e| ClientError::invalid_config("http_client", e))
}

/// Executes [`OutboundRequest`]s under a [`RetryPolicy`].
///
/// Dropping the future returned by [`execute`](Self::execute) cancels the
/// in-flight attempt and any pending retry.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    policy: RetryPolicy,
}

impl Transport {
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Transport over a fresh client with the default timeouts.
    pub fn with_policy(policy: RetryPolicy) -> Result<Self> {
        let client = create_http_client(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)?;
        Ok(Self::new(client, policy))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute a request.
    ///
    /// # Returns
    /// * `Ok(envelope)` for every completed response, error statuses included
    /// * `Err(ClientError::Transport)` when no response could be obtained
    ///   within the retry policy, or the request could not be sent at all
    pub async fn execute(&self, request: &OutboundRequest) -> Result<ResponseEnvelope> {
        let max_attempts = self.policy.attempts();
        let started = Instant::now();
        let method = request.method();
        let url = request.url();

        let mut attempt = 0;
        loop {
            attempt += 1;

            let (failure, retried_envelope) = match self.attempt(request).await {
                Ok(envelope) => {
                    let status = envelope.status_code();
                    if attempt < max_attempts && self.policy.retries_status(status) {
                        let detail =
                            format!("HTTP {status}: {}", truncate_for_log(envelope.body()));
                        (detail, Some(envelope))
                    } else {
                        return Ok(envelope);
                    }
                }
                Err(AttemptError::Fatal(detail)) => {
                    log::error!("{method} {url} could not be sent: {detail}");
                    return Err(ClientError::transport(detail, attempt));
                }
                Err(AttemptError::Retryable(detail)) => {
                    if attempt >= max_attempts {
                        log::error!("{method} {url} failed after {attempt} attempt(s): {detail}");
                        return Err(ClientError::transport(detail, attempt));
                    }
                    (detail, None)
                }
            };

            let delay = self.policy.backoff_delay(attempt - 1);
            if started.elapsed() + delay > self.policy.max_elapsed {
                log::warn!(
                    "{method} {url} retry budget of {:.1}s exhausted after {attempt} attempt(s)",
                    self.policy.max_elapsed.as_secs_f32()
                );
                // A completed response is still passed through untouched.
                return retried_envelope.ok_or_else(|| {
                    ClientError::transport(format!("retry budget exhausted: {failure}"), attempt)
                });
            }

            log::warn!(
                "{method} {url} failed (attempt {attempt}/{max_attempts}), retrying in {:.1}s: {failure}",
                delay.as_secs_f32()
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(
        &self,
        request: &OutboundRequest,
    ) -> std::result::Result<ResponseEnvelope, AttemptError> {
        log::debug!("{} {}", request.method(), request.url());

        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());
        if let Some(body) = request.body() {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                AttemptError::Fatal(e.to_string())
            } else if e.is_timeout() {
                AttemptError::Retryable(format!("request timed out: {e}"))
            } else {
                AttemptError::Retryable(e.to_string())
            }
        })?;

        let status_code = response.status().as_u16();
        log::debug!("Response Status: {status_code}");

        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::Retryable(format!("Failed to read response body: {e}")))?;

        log::debug!("Response Body: {}", truncate_for_log(&body));

        Ok(ResponseEnvelope::new(status_code, body))
    }
}
