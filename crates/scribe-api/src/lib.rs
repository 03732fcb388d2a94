//! Anthropic Messages API client for Scribe.

mod client;
mod provider;
mod retry;

pub use client::ApiClient;
pub use provider::AnthropicProvider;
pub use retry::RetryPolicy;
