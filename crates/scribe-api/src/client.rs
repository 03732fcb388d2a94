//! Anthropic Messages API client.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use scribe_types::{ApiError, CreateMessageRequest, CreateMessageResponse};

use crate::retry::RetryPolicy;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Whole-request timeout. Summarizing a multi-page PDF can take a while.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Client for the Anthropic Messages API.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    headers: HeaderMap,
    base_url: String,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(api_key: &str, base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(api_key, base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        api_key: &str,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key).map_err(|_| ApiError::Auth {
                message: "Invalid API key format".into(),
            })?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        Ok(Self {
            http,
            headers,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Send a Messages API request and return the complete response,
    /// retrying transient failures per the retry policy.
    pub async fn create_message(
        &self,
        request: &CreateMessageRequest,
    ) -> Result<CreateMessageResponse, ApiError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = serde_json::to_vec(request).map_err(|e| ApiError::BadRequest {
            message: format!("Failed to serialize request: {e}"),
        })?;

        let mut attempt = 0;
        loop {
            tracing::debug!(
                "POST {url} model={} messages={} (attempt {})",
                request.model,
                request.messages.len(),
                attempt + 1
            );

            let (err, hint) = match self.send_once(&url, body.clone()).await {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };

            if !self.retry.should_retry(&err, attempt) {
                return Err(err);
            }
            let delay = self.retry.backoff(attempt, hint);
            tracing::warn!(
                "Retryable API error (attempt {}/{}): {err}. Retrying in {}ms...",
                attempt + 1,
                self.retry.max_retries + 1,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// One HTTP round trip. On failure, also returns the server's
    /// `retry-after` hint if it sent one.
    async fn send_once(
        &self,
        url: &str,
        body: Vec<u8>,
    ) -> Result<CreateMessageResponse, (ApiError, Option<Duration>)> {
        let response = self
            .http
            .post(url)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| (transport_error(&e), None))?;

        let status = response.status();
        if !status.is_success() {
            let hint = parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err((classify_error(status.as_u16(), &text, hint), hint));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| (transport_error(&e), None))?;
        serde_json::from_slice(&bytes).map_err(|e| (ApiError::Decode(e.to_string()), None))
    }
}

fn transport_error(e: &reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(e.to_string())
    }
}

/// `retry-after` is given in (possibly fractional) seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Map an HTTP error status and body to an [`ApiError`].
fn classify_error(status: u16, body: &str, retry_after: Option<Duration>) -> ApiError {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: Option<ErrorDetail>,
    }
    #[derive(serde::Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    match status {
        401 | 403 => ApiError::Auth { message },
        400 | 404 | 413 | 422 => ApiError::BadRequest { message },
        429 => ApiError::RateLimited {
            retry_after_ms: retry_after.map(|d| d.as_millis() as u64),
        },
        529 => ApiError::Overloaded,
        _ => ApiError::Server { status, message },
    }
}
