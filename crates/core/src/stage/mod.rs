//! Thumbnail and metadata derivation stages.

mod error;
mod metadata;
mod thumbnail;

pub use error::StageError;
pub use metadata::{MetadataDocument, MetadataOutcome, MetadataStage, TEXT_PREVIEW_PLACEHOLDER};
pub use thumbnail::{Thumbnail, ThumbnailOutcome, ThumbnailStage, THUMBNAIL_MAX_WIDTH};

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::StorageConfig;

/// Bounds a stage invocation.
pub(crate) async fn with_timeout<T>(
    secs: u64,
    work: impl Future<Output = Result<T, StageError>>,
) -> Result<T, StageError> {
    tokio::time::timeout(Duration::from_secs(secs), work)
        .await
        .map_err(|_| StageError::Timeout(secs))?
}

/// Maps a stored upload path to its file, rejecting paths outside the uploads root.
pub(crate) fn upload_source(
    storage: &StorageConfig,
    stored_path: &str,
) -> Result<PathBuf, StageError> {
    storage.resolve_upload(stored_path).ok_or_else(|| {
        StageError::Validation(format!("storage path escapes the uploads root: {}", stored_path))
    })
}
