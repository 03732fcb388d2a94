//! Provider trait for model API providers.

use crate::{ApiError, CreateMessageRequest, CreateMessageResponse};
use std::future::Future;
use std::pin::Pin;

/// Trait for model API providers.
///
/// Dyn-compatible so the agent works with `Arc<dyn Provider>`, and so tests
/// can substitute a scripted provider.
pub trait Provider: Send + Sync {
    /// Send a message request and wait for the complete response.
    fn create_message<'a>(
        &'a self,
        request: &'a CreateMessageRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CreateMessageResponse, ApiError>> + Send + 'a>>;

    /// Provider name for logging/display (e.g., "anthropic").
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn arc_provider_is_send_sync() {
        fn _assert_send_sync<T: Send + Sync>() {}
        _assert_send_sync::<Arc<dyn Provider>>();
    }
}
