use thiserror::Error;

use crate::asset::{AssetId, RegistryError};
use crate::document::DocumentError;
use crate::encoder::EncoderError;

/// Outcome taxonomy shared by every stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// Missing or malformed request fields. Nothing was started.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Asset record or source file is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A transcode for this asset is already running.
    #[error("Transcode already in progress for asset {0}")]
    Conflict(AssetId),

    /// Probe, encode or resize failed.
    #[error("Processing failed: {0}")]
    ToolFailure(String),

    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Stage timed out after {0} seconds")]
    Timeout(u64),

    #[error("Transcode for asset {0} was cancelled")]
    Cancelled(AssetId),
}

impl StageError {
    /// Whether invoking the stage again may succeed without outside change.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RegistryUnavailable(_))
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::ToolFailure(_) => "failed",
            Self::RegistryUnavailable(_) => "registry_unavailable",
            Self::Timeout(_) => "timeout",
            Self::Cancelled(_) => "cancelled",
        }
    }
}

impl From<RegistryError> for StageError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => Self::NotFound(format!("asset {}", id)),
            RegistryError::Validation(msg) => Self::Validation(msg),
            e @ RegistryError::InvalidTransition { .. } => Self::Validation(e.to_string()),
            RegistryError::Database(msg) | RegistryError::Unavailable(msg) => {
                Self::RegistryUnavailable(msg)
            }
        }
    }
}

impl From<EncoderError> for StageError {
    fn from(err: EncoderError) -> Self {
        match err {
            EncoderError::InputNotFound { path } => {
                Self::NotFound(format!("source file {}", path.display()))
            }
            EncoderError::Timeout { timeout_secs } => Self::Timeout(timeout_secs),
            other => Self::ToolFailure(other.to_string()),
        }
    }
}

impl From<DocumentError> for StageError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::InputNotFound { path } => {
                Self::NotFound(format!("source file {}", path.display()))
            }
            DocumentError::Timeout { timeout_secs } => Self::Timeout(timeout_secs),
            other => Self::ToolFailure(other.to_string()),
        }
    }
}
