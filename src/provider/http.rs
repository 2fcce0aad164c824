use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use url::Url;

use super::KeyProvider;
use crate::error::{ProviderError, ProviderResult};

/// key: http-key-provider
/// Provider backed by a merchant endpoint that mints ephemeral keys. The response body is
/// handed back verbatim so the manager can parse and forward it.
pub struct HttpKeyProvider {
    client: reqwest::Client,
    endpoint: Url,
    auth_token: Option<String>,
}

impl HttpKeyProvider {
    pub fn new(endpoint: impl AsRef<str>, auth_token: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint.as_ref()).context("invalid ephemeral key endpoint")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build ephemeral key client")?;
        Ok(Self {
            client,
            endpoint,
            auth_token,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.auth_token {
            request.bearer_auth(token)
        } else {
            request
        }
    }
}

#[async_trait]
impl KeyProvider for HttpKeyProvider {
    async fn create_ephemeral_key(&self, api_version: &str) -> ProviderResult {
        let response = self
            .auth(self.client.post(self.endpoint.clone()))
            .json(&json!({ "api_version": api_version }))
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(?err, endpoint = %self.endpoint, "ephemeral key endpoint unreachable");
                ProviderError::internal(format!("failed to reach ephemeral key endpoint: {err}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            ProviderError::internal(format!("failed to read ephemeral key response: {err}"))
        })?;

        if status.is_success() {
            return Ok(body);
        }

        let message = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("ephemeral key request failed")
                .to_string()
        } else {
            body
        };
        Err(ProviderError::new(i32::from(status.as_u16()), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_endpoint() {
        let err = HttpKeyProvider::new("not a url", None).err().unwrap();
        assert!(err.to_string().contains("invalid ephemeral key endpoint"));
    }

    #[test]
    fn keeps_parsed_endpoint() {
        let provider = HttpKeyProvider::new("https://example.com/ephemeral_keys", None).unwrap();
        assert_eq!(provider.endpoint().path(), "/ephemeral_keys");
    }
}
