use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageReader;
use serde::Serialize;
use tracing::{info, warn};

use super::{upload_source, with_timeout, StageError};
use crate::asset::{AssetId, AssetPatch, AssetRegistry, MediaCategory};
use crate::config::{StorageConfig, THUMBNAILS_PREFIX};
use crate::encoder::{Encoder, FrameJob};
use crate::metrics::STAGE_INVOCATIONS;

/// Maximum thumbnail width in pixels.
pub const THUMBNAIL_MAX_WIDTH: u32 = 300;

const JPEG_QUALITY: u8 = 80;

/// A written thumbnail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thumbnail {
    /// Path as recorded on the asset, `thumbnails/{id}_thumb.jpg`.
    pub thumbnail_path: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailOutcome {
    Created(Thumbnail),
    /// The asset category has no thumbnail.
    Unsupported,
}

/// Derives one preview image per asset.
pub struct ThumbnailStage {
    registry: Arc<dyn AssetRegistry>,
    encoder: Arc<dyn Encoder>,
    storage: StorageConfig,
    timeout_secs: u64,
}

impl ThumbnailStage {
    pub fn new(
        registry: Arc<dyn AssetRegistry>,
        encoder: Arc<dyn Encoder>,
        storage: StorageConfig,
        timeout_secs: u64,
    ) -> Self {
        Self {
            registry,
            encoder,
            storage,
            timeout_secs,
        }
    }

    fn file_name(asset_id: AssetId) -> String {
        format!("{}_thumb.jpg", asset_id)
    }

    pub async fn run(&self, asset_id: AssetId) -> Result<ThumbnailOutcome, StageError> {
        let result = with_timeout(self.timeout_secs, self.derive(asset_id)).await;

        let label = match &result {
            Ok(ThumbnailOutcome::Created(_)) => "success",
            Ok(ThumbnailOutcome::Unsupported) => "unsupported",
            Err(e) => e.label(),
        };
        STAGE_INVOCATIONS
            .with_label_values(&["thumbnail", label])
            .inc();

        match &result {
            Ok(ThumbnailOutcome::Created(thumb)) => info!(
                asset_id,
                path = %thumb.thumbnail_path,
                width = thumb.width,
                height = thumb.height,
                "Thumbnail created"
            ),
            Ok(ThumbnailOutcome::Unsupported) => {
                info!(asset_id, "No thumbnail for this asset type")
            }
            Err(e) => warn!(asset_id, error = %e, "Thumbnail stage failed"),
        }

        result
    }

    async fn derive(&self, asset_id: AssetId) -> Result<ThumbnailOutcome, StageError> {
        let asset = self
            .registry
            .get(asset_id)?
            .ok_or_else(|| StageError::NotFound(format!("asset {}", asset_id)))?;

        let category = asset.category();
        if !matches!(category, MediaCategory::Image | MediaCategory::Video) {
            return Ok(ThumbnailOutcome::Unsupported);
        }

        let source = upload_source(&self.storage, &asset.path)?;
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            return Err(StageError::NotFound(format!(
                "source file {}",
                source.display()
            )));
        }

        tokio::fs::create_dir_all(&self.storage.thumbnails_root)
            .await
            .map_err(|e| {
                StageError::ToolFailure(format!(
                    "cannot create {}: {}",
                    self.storage.thumbnails_root.display(),
                    e
                ))
            })?;

        let file_name = Self::file_name(asset_id);
        let output = self.storage.thumbnails_root.join(&file_name);

        let (width, height) = match category {
            MediaCategory::Image => {
                let (src, dst) = (source.clone(), output.clone());
                tokio::task::spawn_blocking(move || {
                    render_image_thumbnail(&src, &dst, THUMBNAIL_MAX_WIDTH)
                })
                .await
                .map_err(|e| StageError::ToolFailure(format!("resize task failed: {}", e)))??
            }
            _ => {
                let mut job = FrameJob::new(source, output);
                job.max_width = THUMBNAIL_MAX_WIDTH;
                let frame = self.encoder.capture_frame(job).await?;
                (frame.width, frame.height)
            }
        };

        let thumbnail_path = format!("{}{}", THUMBNAILS_PREFIX, file_name);
        self.registry.update(
            asset_id,
            AssetPatch::new().with_thumbnail_path(thumbnail_path.clone()),
        )?;

        Ok(ThumbnailOutcome::Created(Thumbnail {
            thumbnail_path,
            width,
            height,
        }))
    }
}

/// Height that keeps the aspect ratio at `target_width`.
pub(crate) fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    let scaled = (f64::from(height) * f64::from(target_width) / f64::from(width)).round();
    (scaled as u32).max(1)
}

fn tool_failure(e: impl std::fmt::Display) -> StageError {
    StageError::ToolFailure(format!("thumbnail: {}", e))
}

/// Decodes an image, shrinks it to `max_width` if wider, and writes a JPEG.
fn render_image_thumbnail(
    source: &Path,
    dest: &Path,
    max_width: u32,
) -> Result<(u32, u32), StageError> {
    let image = ImageReader::open(source)
        .map_err(tool_failure)?
        .with_guessed_format()
        .map_err(tool_failure)?
        .decode()
        .map_err(tool_failure)?;

    let image = if image.width() > max_width {
        let height = scaled_height(image.width(), image.height(), max_width);
        image.resize_exact(max_width, height, FilterType::Lanczos3)
    } else {
        image
    };

    let rgb = image.to_rgb8();
    let file = File::create(dest).map_err(tool_failure)?;
    let mut writer = BufWriter::new(file);
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY))
        .map_err(tool_failure)?;
    writer.flush().map_err(tool_failure)?;

    Ok((rgb.width(), rgb.height()))
}
