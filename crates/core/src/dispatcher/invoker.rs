use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::debug;

use super::{DispatchError, StageInvoker, StageRequest};
use crate::config::DispatcherConfig;
use crate::stage::{MetadataStage, StageError, ThumbnailStage};
use crate::transcode::{TranscodeRequest, TranscodeStage};

impl From<StageError> for DispatchError {
    fn from(err: StageError) -> Self {
        if err.is_transient() {
            Self::Transient(err.to_string())
        } else {
            Self::Rejected(err.to_string())
        }
    }
}

/// Runs stages in this process.
///
/// Thumbnail and metadata complete within the delivery task; transcode is
/// accepted and continues in the background.
pub struct LocalInvoker {
    thumbnail: Arc<ThumbnailStage>,
    metadata: Arc<MetadataStage>,
    transcode: Arc<TranscodeStage>,
}

impl LocalInvoker {
    pub fn new(
        thumbnail: Arc<ThumbnailStage>,
        metadata: Arc<MetadataStage>,
        transcode: Arc<TranscodeStage>,
    ) -> Self {
        Self {
            thumbnail,
            metadata,
            transcode,
        }
    }
}

#[async_trait]
impl StageInvoker for LocalInvoker {
    async fn invoke(&self, request: &StageRequest) -> Result<(), DispatchError> {
        match request {
            StageRequest::Thumbnail { asset_id } => {
                self.thumbnail.run(*asset_id).await?;
            }
            StageRequest::Metadata { asset_id } => {
                self.metadata.run(*asset_id).await?;
            }
            StageRequest::Transcode {
                asset_id,
                storage_path,
            } => {
                self.transcode
                    .submit(TranscodeRequest::new(*asset_id, storage_path.clone()))
                    .await?;
            }
        }
        Ok(())
    }
}

/// Invokes stage services over HTTP.
pub struct HttpInvoker {
    client: Client,
    thumbnail_url: String,
    metadata_url: String,
    transcode_url: String,
}

impl HttpInvoker {
    pub fn new(
        thumbnail_url: impl Into<String>,
        metadata_url: impl Into<String>,
        transcode_url: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DispatchError::Rejected(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            thumbnail_url: thumbnail_url.into(),
            metadata_url: metadata_url.into(),
            transcode_url: transcode_url.into(),
        })
    }

    /// Builds an invoker from the `[dispatcher]` section. All three URLs must be set.
    pub fn from_config(config: &DispatcherConfig) -> Result<Self, DispatchError> {
        let require = |url: &Option<String>, name: &str| {
            url.clone()
                .ok_or_else(|| DispatchError::Rejected(format!("dispatcher.{} is not set", name)))
        };

        Self::new(
            require(&config.thumbnail_url, "thumbnail_url")?,
            require(&config.metadata_url, "metadata_url")?,
            require(&config.transcode_url, "transcode_url")?,
            config.request_timeout_secs,
        )
    }

    fn target(&self, request: &StageRequest) -> (&str, serde_json::Value) {
        match request {
            StageRequest::Thumbnail { asset_id } => {
                (&self.thumbnail_url, json!({ "assetId": asset_id }))
            }
            StageRequest::Metadata { asset_id } => {
                (&self.metadata_url, json!({ "assetId": asset_id }))
            }
            StageRequest::Transcode {
                asset_id,
                storage_path,
            } => (
                &self.transcode_url,
                json!({ "assetId": asset_id, "storagePath": storage_path }),
            ),
        }
    }
}

/// Whether a stage response status is worth retrying.
fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

#[async_trait]
impl StageInvoker for HttpInvoker {
    async fn invoke(&self, request: &StageRequest) -> Result<(), DispatchError> {
        let (url, body) = self.target(request);

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DispatchError::Transient(e.to_string()))?;

        let status = response.status();
        debug!(
            asset_id = request.asset_id(),
            stage = request.kind().as_str(),
            status = status.as_u16(),
            "Stage responded"
        );

        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let reason = format!("{} returned {}: {}", url, status, body);
        if is_retryable_status(status) {
            Err(DispatchError::Transient(reason))
        } else {
            Err(DispatchError::Rejected(reason))
        }
    }
}
