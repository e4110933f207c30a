//! HTTP fetcher for entity payloads offloaded to blob storage.

use std::time::Duration;

use super::{BlobFetcher, ProviderError};

/// Fetches offloaded payloads over plain HTTP(S).
///
/// Blob URIs recorded by the backend are expected to carry their own access
/// token (SAS-style), so no extra authentication is added here.
#[derive(Clone)]
pub struct HttpBlobFetcher {
    client: reqwest::Client,
}

impl HttpBlobFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::permanent("build_blob_client", e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl BlobFetcher for HttpBlobFetcher {
    async fn fetch(&self, uri: &str) -> Result<String, ProviderError> {
        tracing::debug!(target: "duroxide_host::providers::blob", uri = %uri, "Fetching offloaded payload");
        let body = self
            .client
            .get(uri)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}
