//! Delivery targets for status updates.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use super::StatusUpdate;
use crate::asset::{AssetRegistry, RegistryError};

/// Where status updates are applied.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Apply one update. Transient errors (see [`RegistryError::is_transient`])
    /// are retried by the outbox; anything else is final.
    async fn deliver(&self, update: &StatusUpdate) -> Result<(), RegistryError>;
}

/// Applies updates to an in-process registry.
pub struct RegistryStatusSink {
    registry: Arc<dyn AssetRegistry>,
}

impl RegistryStatusSink {
    pub fn new(registry: Arc<dyn AssetRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl StatusSink for RegistryStatusSink {
    async fn deliver(&self, update: &StatusUpdate) -> Result<(), RegistryError> {
        self.registry
            .update(update.asset_id, update.to_patch())
            .map(|_| ())
    }
}

/// Posts updates to a remote `update-stream-status` endpoint.
pub struct HttpStatusSink {
    client: Client,
    url: String,
}

impl HttpStatusSink {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RegistryError::Unavailable(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl StatusSink for HttpStatusSink {
    async fn deliver(&self, update: &StatusUpdate) -> Result<(), RegistryError> {
        let response = self
            .client
            .post(&self.url)
            .json(update)
            .send()
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(RegistryError::NotFound(update.asset_id)),
            s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => Err(
                RegistryError::Unavailable(format!("registry returned {}: {}", s, body)),
            ),
            s => Err(RegistryError::Validation(format!(
                "registry rejected update with {}: {}",
                s, body
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{NewAsset, SqliteAssetRegistry, StreamStatus};

    #[tokio::test]
    async fn test_registry_sink_applies_patch() {
        let registry = Arc::new(SqliteAssetRegistry::in_memory().unwrap());
        let asset = registry
            .create(NewAsset::new("uploads/v", "video/webm", 1))
            .unwrap();
        let sink = RegistryStatusSink::new(registry.clone());

        sink.deliver(&StatusUpdate::processing(asset.id)).await.unwrap();

        let stored = registry.get(asset.id).unwrap().unwrap();
        assert_eq!(stored.stream_status, StreamStatus::Processing);
    }

    #[tokio::test]
    async fn test_registry_sink_surfaces_rejection() {
        let registry = Arc::new(SqliteAssetRegistry::in_memory().unwrap());
        let sink = RegistryStatusSink::new(registry);

        let err = sink.deliver(&StatusUpdate::failed(77)).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(77)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_http_sink_unreachable_is_transient() {
        // Port 9 (discard) is not listening in test environments.
        let sink = HttpStatusSink::new("http://127.0.0.1:9/update-stream-status", 2).unwrap();
        let err = sink.deliver(&StatusUpdate::processing(1)).await.unwrap_err();
        assert!(err.is_transient());
    }
}
