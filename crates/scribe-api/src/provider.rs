//! Anthropic Messages API provider implementation.

use crate::client::ApiClient;
use crate::retry::RetryPolicy;
use scribe_types::provider::Provider;
use scribe_types::{ApiError, CreateMessageRequest, CreateMessageResponse};
use std::future::Future;
use std::pin::Pin;

/// [`Provider`] backed by [`ApiClient`]. Retry logic stays in the client.
#[derive(Clone)]
pub struct AnthropicProvider {
    client: ApiClient,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, base_url: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self {
            client: ApiClient::new(api_key, base_url)?,
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.client = self.client.with_retry_policy(policy);
        self
    }
}

impl Provider for AnthropicProvider {
    fn create_message<'a>(
        &'a self,
        request: &'a CreateMessageRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CreateMessageResponse, ApiError>> + Send + 'a>> {
        Box::pin(self.client.create_message(request))
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}
