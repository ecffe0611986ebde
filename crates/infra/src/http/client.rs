//! Shared reqwest client for discovery, token and user-info calls.
//!
//! Transport failures and 5xx responses are retried under a [`RetryPolicy`];
//! 4xx responses come back untouched because OAuth error bodies travel on
//! them. Requests that must not be replayed go through
//! [`HttpClient::send_non_idempotent`], which only retries connection
//! failures.

use std::time::Duration;

use realmkey_domain::{AuthError, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::errors::to_auth;

const USER_AGENT: &str = concat!("realmkey/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Exponential backoff: `initial_delay * 2^(retry - 1)`, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn retries_status(status: StatusCode) -> bool {
        status.is_server_error()
    }

    // A failed connect means the request never left; anything later may
    // already have been processed.
    fn retries_error(err: &reqwest::Error, replayable: bool) -> bool {
        err.is_connect() || (replayable && (err.is_timeout() || err.is_request()))
    }
}

/// Cloneable HTTP client; clones share the connection pool.
#[derive(Clone)]
pub struct HttpClient {
    inner: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Client with the default timeout and retry policy.
    ///
    /// # Errors
    /// `AuthError::Network` when the TLS backend cannot be initialised.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn request(&self, method: Method, url: impl reqwest::IntoUrl) -> RequestBuilder {
        self.inner.request(method, url)
    }

    /// Send `builder`, retrying per the client's policy.
    ///
    /// # Errors
    /// The mapped transport error of the last attempt. Non-success statuses
    /// are not errors here.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        self.send_with_retry(builder, true).await
    }

    /// Send a request the server must see at most once, such as a token grant
    /// carrying a single-use code or a rotating refresh token.
    ///
    /// Only connection failures are retried. Timeouts and 5xx responses are
    /// returned from the first attempt.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub async fn send_non_idempotent(&self, builder: RequestBuilder) -> Result<Response> {
        self.send_with_retry(builder, false).await
    }

    async fn send_with_retry(&self, builder: RequestBuilder, replayable: bool) -> Result<Response> {
        let attempts = self.retry.max_attempts.max(1);
        let mut retry = 0u32;

        loop {
            let request = builder
                .try_clone()
                .ok_or_else(|| AuthError::Internal("streaming request bodies cannot be retried".into()))?
                .build()
                .map_err(to_auth)?;
            let method = request.method().clone();
            let url = redact_query(request.url());
            let last_attempt = retry as usize + 1 >= attempts;

            match self.inner.execute(request).await {
                Ok(response)
                    if replayable
                        && RetryPolicy::retries_status(response.status())
                        && !last_attempt =>
                {
                    warn!(%method, %url, status = %response.status(), retry, "server error; retrying");
                }
                Ok(response) => {
                    debug!(%method, %url, status = %response.status(), "HTTP response");
                    return Ok(response);
                }
                Err(err) if RetryPolicy::retries_error(&err, replayable) && !last_attempt => {
                    warn!(%method, %url, error = %err, retry, "transport error; retrying");
                }
                Err(err) => return Err(to_auth(err)),
            }

            retry += 1;
            let delay = self.retry.delay_for(retry);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Deserialize a response body as JSON.
///
/// # Errors
/// `AuthError::InvalidResponse` when the body is not the expected JSON.
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response.bytes().await.map_err(to_auth)?;
    serde_json::from_slice(&body).map_err(to_auth)
}

#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    retry: RetryPolicy,
    user_agent: String,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl HttpClientBuilder {
    /// Per-request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// # Errors
    /// `AuthError::Network` when reqwest cannot build its client.
    pub fn build(self) -> Result<HttpClient> {
        let inner = Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent)
            .no_proxy()
            .build()
            .map_err(to_auth)?;

        Ok(HttpClient { inner, retry: self.retry })
    }
}

// Authorization codes and token hints travel in query strings.
fn redact_query(url: &Url) -> String {
    let mut redacted = url.clone();
    redacted.set_query(None);
    redacted.to_string()
}
