use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::ImageReader;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{upload_source, with_timeout, StageError};
use crate::asset::{AssetId, AssetPatch, AssetRegistry, MediaCategory, STATUS_METADATA_DONE};
use crate::config::StorageConfig;
use crate::document::DocumentInspector;
use crate::encoder::Prober;
use crate::metrics::STAGE_INVOCATIONS;

/// Characters of first-page text kept in a document preview.
pub const TEXT_PREVIEW_CHARS: usize = 200;

/// Preview used when no text can be extracted.
pub const TEXT_PREVIEW_PLACEHOLDER: &str = "Text extraction not available";

/// Type-specific metadata, stored as the asset's metadata document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetadataDocument {
    Image {
        width: u32,
        height: u32,
        /// Detected sub-format, e.g. `jpeg`.
        #[serde(rename = "type")]
        format: String,
    },
    Video {
        duration: f64,
        size: u64,
        format: String,
        bitrate: Option<u64>,
    },
    Audio {
        duration: f64,
        format: String,
        bitrate: Option<u64>,
    },
    Document {
        pages: u32,
        #[serde(rename = "textPreview")]
        text_preview: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataOutcome {
    Extracted(serde_json::Value),
    /// No extractor for this category; nothing stored.
    Unsupported,
}

/// Derives and stores type-specific metadata per asset.
pub struct MetadataStage {
    registry: Arc<dyn AssetRegistry>,
    prober: Arc<dyn Prober>,
    inspector: Arc<dyn DocumentInspector>,
    storage: StorageConfig,
    timeout_secs: u64,
}

impl MetadataStage {
    pub fn new(
        registry: Arc<dyn AssetRegistry>,
        prober: Arc<dyn Prober>,
        inspector: Arc<dyn DocumentInspector>,
        storage: StorageConfig,
        timeout_secs: u64,
    ) -> Self {
        Self {
            registry,
            prober,
            inspector,
            storage,
            timeout_secs,
        }
    }

    pub async fn run(&self, asset_id: AssetId) -> Result<MetadataOutcome, StageError> {
        let result = with_timeout(self.timeout_secs, self.extract_and_store(asset_id)).await;

        let label = match &result {
            Ok(MetadataOutcome::Extracted(_)) => "success",
            Ok(MetadataOutcome::Unsupported) => "unsupported",
            Err(e) => e.label(),
        };
        STAGE_INVOCATIONS
            .with_label_values(&["metadata", label])
            .inc();

        match &result {
            Ok(MetadataOutcome::Extracted(_)) => info!(asset_id, "Metadata extracted"),
            Ok(MetadataOutcome::Unsupported) => info!(asset_id, "No metadata extracted"),
            Err(e) => warn!(asset_id, error = %e, "Metadata stage failed"),
        }

        result
    }

    async fn extract_and_store(&self, asset_id: AssetId) -> Result<MetadataOutcome, StageError> {
        let asset = self
            .registry
            .get(asset_id)?
            .ok_or_else(|| StageError::NotFound(format!("asset {}", asset_id)))?;

        let category = asset.category();
        if category == MediaCategory::Other {
            return Ok(MetadataOutcome::Unsupported);
        }

        let source = upload_source(&self.storage, &asset.path)?;
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            return Err(StageError::NotFound(format!(
                "source file {}",
                source.display()
            )));
        }

        let document = match category {
            MediaCategory::Image => read_image_header(source).await?,
            MediaCategory::Video => {
                let probe = self.prober.probe(&source).await?;
                MetadataDocument::Video {
                    duration: probe.duration_secs,
                    size: probe.size_bytes,
                    format: probe.display_format().to_string(),
                    bitrate: probe.bit_rate,
                }
            }
            MediaCategory::Audio => {
                let probe = self.prober.probe(&source).await?;
                MetadataDocument::Audio {
                    duration: probe.duration_secs,
                    format: probe.display_format().to_string(),
                    bitrate: probe.bit_rate,
                }
            }
            MediaCategory::Document => self.inspect_document(&source).await?,
            MediaCategory::Other => return Ok(MetadataOutcome::Unsupported),
        };

        let value = serde_json::to_value(&document)
            .map_err(|e| StageError::ToolFailure(format!("metadata encoding: {}", e)))?;

        self.registry.upsert_metadata(asset_id, value.clone())?;
        self.registry
            .update(asset_id, AssetPatch::new().with_status(STATUS_METADATA_DONE))?;

        Ok(MetadataOutcome::Extracted(value))
    }

    async fn inspect_document(&self, source: &Path) -> Result<MetadataDocument, StageError> {
        let pages = self.inspector.page_count(source).await?;

        let text_preview = match self.inspector.first_page_text(source).await {
            Ok(text) => preview(&text),
            Err(e) => {
                debug!(path = %source.display(), error = %e, "Text extraction unavailable");
                None
            }
        }
        .unwrap_or_else(|| TEXT_PREVIEW_PLACEHOLDER.to_string());

        Ok(MetadataDocument::Document {
            pages,
            text_preview,
        })
    }
}

/// First `TEXT_PREVIEW_CHARS` characters of whitespace-collapsed text.
fn preview(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    Some(collapsed.chars().take(TEXT_PREVIEW_CHARS).collect())
}

/// Reads dimensions and format from the image header without decoding pixels.
async fn read_image_header(source: PathBuf) -> Result<MetadataDocument, StageError> {
    tokio::task::spawn_blocking(move || {
        let reader = ImageReader::open(&source)
            .and_then(|r| r.with_guessed_format())
            .map_err(|e| StageError::ToolFailure(format!("image header: {}", e)))?;

        let format = reader
            .format()
            .map(|f| format!("{:?}", f).to_lowercase())
            .ok_or_else(|| StageError::ToolFailure("unrecognized image format".to_string()))?;

        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| StageError::ToolFailure(format!("image header: {}", e)))?;

        Ok(MetadataDocument::Image {
            width,
            height,
            format,
        })
    })
    .await
    .map_err(|e| StageError::ToolFailure(format!("header task failed: {}", e)))?
}
