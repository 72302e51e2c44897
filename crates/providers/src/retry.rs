//! Model-client retry — bounded attempts with linear backoff and per-attempt timeouts.
//!
//! Transient failures (rate limits, timeouts, network errors, 5xx responses)
//! are retried; permanent failures surface immediately. Once the attempt
//! budget is spent the last failure is wrapped in
//! [`ModelError::RetriesExhausted`].

use async_trait::async_trait;
use reflace_core::error::ModelError;
use reflace_core::model::{ModelClient, ModelRequest, ModelResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A model client that retries its inner client on transient failure.
pub struct RetryingClient {
    name: String,
    inner: Arc<dyn ModelClient>,
    max_attempts: u32,
    backoff: Duration,
    attempt_timeout: Option<Duration>,
}

impl RetryingClient {
    /// Wrap a client with the default policy: 3 attempts, 1s linear backoff.
    pub fn new(inner: Arc<dyn ModelClient>) -> Self {
        let name = format!("retry({})", inner.name());
        Self {
            name,
            inner,
            max_attempts: 3,
            backoff: Duration::from_secs(1),
            attempt_timeout: None,
        }
    }

    /// Total attempts per request, including the first. Clamped to at least 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Base delay; attempt `n` waits `n * backoff` before retrying.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Abandon an attempt that takes longer than `timeout`.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    async fn attempt(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        match self.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.inner.complete(request)).await {
                Ok(result) => result,
                Err(_) => Err(ModelError::Timeout(format!(
                    "'{}' did not answer within {}ms",
                    self.inner.name(),
                    limit.as_millis()
                ))),
            },
            None => self.inner.complete(request).await,
        }
    }
}

#[async_trait]
impl ModelClient for RetryingClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            debug!(
                client = %self.inner.name(),
                attempt,
                max_attempts = self.max_attempts,
                "Model call"
            );

            match self.attempt(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() => {
                    warn!(
                        client = %self.inner.name(),
                        attempt,
                        error = %e,
                        "Model call failed, retrying"
                    );
                    last_error = Some(e);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.backoff * attempt).await;
                    }
                }
                Err(e) => {
                    warn!(client = %self.inner.name(), error = %e, "Model call failed permanently");
                    return Err(e);
                }
            }
        }

        Err(ModelError::RetriesExhausted {
            attempts: self.max_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt was made".into()),
        })
    }
}
