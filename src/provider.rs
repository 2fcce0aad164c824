use async_trait::async_trait;

use crate::error::ProviderResult;

mod http;

pub use http::HttpKeyProvider;

/// key: ephemeral-key-provider
/// Fetches raw key material for the given API version. Each call resolves exactly once, with
/// either the raw body (usually JSON) or a coded error.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn create_ephemeral_key(&self, api_version: &str) -> ProviderResult;
}
