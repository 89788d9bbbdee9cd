//! Rate-limited JSON request client shared by all source adapters.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::source_policy::SourcePolicy;
use crate::throttling::SourceThrottle;
use crate::SourceTag;

const ERROR_BODY_PREVIEW: usize = 200;

/// Terminal failure of an upstream call after the retry budget is spent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{provider} request to '{target}' failed{}: {message}", status_suffix(.status))]
pub struct UpstreamError {
    pub provider: SourceTag,
    pub target: String,
    pub status: Option<u16>,
    pub message: String,
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|status| format!(" with status {status}"))
        .unwrap_or_default()
}

/// One source's HTTP entry point: throttling, retry with backoff, 429 handling, JSON decoding.
#[derive(Clone)]
pub struct RequestClient {
    base_url: String,
    http: Arc<dyn HttpClient>,
    auth: HttpAuth,
    policy: SourcePolicy,
    throttle: SourceThrottle,
}

impl RequestClient {
    pub fn new(
        policy: SourcePolicy,
        base_url: impl Into<String>,
        http: Arc<dyn HttpClient>,
        auth: HttpAuth,
    ) -> Self {
        let throttle = SourceThrottle::from_policy(&policy);
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            http,
            auth,
            policy,
            throttle,
        }
    }

    pub const fn source(&self) -> SourceTag {
        self.policy.source
    }

    pub fn policy(&self) -> &SourcePolicy {
        &self.policy
    }

    /// `GET {base}{path}?{params}` and decode the JSON body.
    pub async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, UpstreamError> {
        let url = format!("{}{}{}", self.base_url, path, encode_query(params));
        self.send(path, || HttpRequest::get(url.clone()).with_auth(&self.auth))
            .await
    }

    /// `POST {base}{path}` with a JSON body and decode the JSON response.
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);
        let body = body.to_string();
        self.send(path, || {
            HttpRequest::post_json(url.clone(), body.clone()).with_auth(&self.auth)
        })
        .await
    }

    async fn send<F>(&self, endpoint: &str, build: F) -> Result<Value, UpstreamError>
    where
        F: Fn() -> HttpRequest,
    {
        let retry = &self.policy.retry;
        let source = self.policy.source;
        let max_attempts = retry.max_attempts.max(1);
        let mut failed_attempts = 0_u32;
        let mut rate_limit_waits = 0_u32;

        loop {
            let outcome = {
                let _permit = self.throttle.acquire().await;
                self.http.execute(build()).await
            };

            let (status, message) = match outcome {
                Ok(response) if response.is_success() => {
                    match serde_json::from_str::<Value>(&response.body) {
                        Ok(value) => {
                            debug!(%source, endpoint, "upstream call succeeded");
                            return Ok(value);
                        }
                        Err(err) => (
                            Some(response.status),
                            format!("response body is not valid JSON: {err}"),
                        ),
                    }
                }
                Ok(response) if response.is_rate_limited() => {
                    if rate_limit_waits >= retry.max_rate_limit_waits {
                        error!(%source, endpoint, rate_limit_waits, "rate limit persisted, giving up");
                        return Err(self.upstream_error(
                            endpoint,
                            Some(response.status),
                            "rate limited",
                        ));
                    }
                    rate_limit_waits += 1;
                    let delay = retry.rate_limit_delay(response.retry_after);
                    warn!(
                        %source,
                        endpoint,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, waiting before retrying the same attempt"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Ok(response) => (Some(response.status), preview(&response.body)),
                Err(err) if !err.retryable() => {
                    error!(%source, endpoint, error = %err, "non-retryable transport error");
                    return Err(self.upstream_error(endpoint, None, err.message()));
                }
                Err(err) => (None, err.message().to_owned()),
            };

            rate_limit_waits = 0;
            failed_attempts += 1;
            if failed_attempts >= max_attempts {
                error!(
                    %source,
                    endpoint,
                    attempts = failed_attempts,
                    status = ?status,
                    message = %message,
                    "upstream call failed after exhausting retries"
                );
                return Err(self.upstream_error(endpoint, status, message));
            }

            let delay = retry.delay_for_attempt(failed_attempts - 1);
            warn!(
                %source,
                endpoint,
                attempt = failed_attempts,
                status = ?status,
                delay_ms = delay.as_millis() as u64,
                message = %message,
                "upstream call failed, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn upstream_error(
        &self,
        target: &str,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> UpstreamError {
        UpstreamError {
            provider: self.policy.source,
            target: target.to_owned(),
            status,
            message: message.into(),
        }
    }
}

fn encode_query(params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return String::new();
    }
    let pairs = params
        .iter()
        .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
        .collect::<Vec<_>>();
    format!("?{}", pairs.join("&"))
}

fn preview(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(ERROR_BODY_PREVIEW) {
        Some((index, _)) => format!("{}...", &trimmed[..index]),
        None => trimmed.to_owned(),
    }
}
