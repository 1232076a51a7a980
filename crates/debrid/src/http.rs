//! Shared HTTP client for provider adapters.
//!
//! Every provider call goes through [`HttpClient::send`], which retries
//! rate-limit and server-error responses a bounded number of times.

use crate::error::{ErrorKind, Result};
use debrix_config::{DebridSettings, Settings};
use exn::ResultExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Statuses worth another try after a short pause.
pub const RETRYABLE_STATUSES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// How hard adapters try before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts for provider-level transient errors.
    pub max_attempts: u32,
    pub attempt_delay: Duration,
    /// Retryable HTTP responses tolerated within one call.
    pub http_max_retries: u32,
    pub http_retry_delay: Duration,
}
impl RetryPolicy {
    /// Same limits as the defaults, without any waiting.
    pub fn immediate(max_attempts: u32) -> Self {
        Self { max_attempts, attempt_delay: Duration::ZERO, http_max_retries: 5, http_retry_delay: Duration::ZERO }
    }
}
impl From<&DebridSettings> for RetryPolicy {
    fn from(settings: &DebridSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            attempt_delay: settings.attempt_delay(),
            http_max_retries: settings.http_max_retries.max(1),
            http_retry_delay: settings.http_retry_delay(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    policy: RetryPolicy,
    probe_timeout: Duration,
}
impl HttpClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let agent = settings.http.user_agent.clone().unwrap_or_else(|| settings.addon_name.clone());
        let mut builder = Client::builder().timeout(settings.http.timeout()).user_agent(agent);
        if let Some(proxy) = &settings.http.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).or_raise(|| ErrorKind::Client)?);
        }
        let client = builder.build().or_raise(|| ErrorKind::Client)?;
        Ok(Self { client, policy: RetryPolicy::from(&settings.debrid), probe_timeout: settings.http.probe_timeout() })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy, probe_timeout: Duration::from_secs(3) }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Per-request timeout for cache probes.
    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Send the request built by `build`, rebuilding and resending it while
    /// the response status is one of [`RETRYABLE_STATUSES`].
    ///
    /// Fails with [`ErrorKind::RetryExhausted`] once `http_max_retries`
    /// retryable responses were seen, and with [`ErrorKind::Transport`] if
    /// the request couldn't be sent at all. Any other status is returned
    /// as is for the adapter to interpret.
    pub async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut failures = 0;
        loop {
            let response = build(&self.client).send().await.or_raise(|| ErrorKind::Transport)?;
            let status = response.status();
            if !RETRYABLE_STATUSES.contains(&status) {
                return Ok(response);
            }
            failures += 1;
            if failures >= self.policy.http_max_retries {
                warn!(%status, failures, "giving up on retryable HTTP status");
                exn::bail!(ErrorKind::RetryExhausted(status.as_u16()));
            }
            debug!(%status, failures, max = self.policy.http_max_retries, "retryable HTTP status, retrying");
            tokio::time::sleep(self.policy.http_retry_delay).await;
        }
    }
}

#[cfg(test)]
pub(crate) fn test_client() -> HttpClient {
    HttpClient::with_client(Client::new(), RetryPolicy::immediate(3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(3)
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let http = test_client();
        let url = format!("{}/flaky", server.uri());
        let response = http.send(|client| client.get(&url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(429)).expect(5).mount(&server).await;

        let http = test_client();
        let err = http.send(|client| client.get(server.uri())).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RetryExhausted(429)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_other_statuses_are_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(404)).expect(1).mount(&server).await;

        let response = test_client().send(|client| client.get(server.uri())).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_transport_error() {
        // Nothing listens on port 9 (discard) in the test environment.
        let err = test_client().send(|client| client.get("http://127.0.0.1:9/")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Transport));
    }

    #[test]
    fn test_policy_from_settings() {
        let policy = RetryPolicy::from(&DebridSettings::default());
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.attempt_delay, Duration::from_secs(4));
        assert_eq!(policy.http_max_retries, 5);
    }
}
