//! Asset record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::STREAMS_PREFIX;
use crate::rendition::MASTER_MANIFEST_NAME;

/// Registry-assigned asset identifier.
pub type AssetId = i64;

/// Status written at creation.
pub const STATUS_NEW: &str = "new";

/// Status written by the metadata stage.
pub const STATUS_METADATA_DONE: &str = "metadata_done";

/// Transcode lifecycle of an asset. Owned by the transcode stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    #[default]
    None,
    Processing,
    Ready,
    Failed,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    /// Whether the registry accepts a move from `self` to `next`.
    ///
    /// Re-reporting the current state is accepted. `ready` and `failed` only
    /// leave through a restart into `processing`.
    pub fn can_transition_to(&self, next: StreamStatus) -> bool {
        use StreamStatus::*;

        *self == next
            || matches!(
                (self, next),
                (None, Processing)
                    | (Processing, Ready)
                    | (Processing, Failed)
                    | (Ready, Processing)
                    | (Failed, Processing)
            )
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "processing" => Ok(Self::Processing),
            "ready" => Ok(Self::Ready),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown stream status: {}", other)),
        }
    }
}

/// Coarse category derived from a MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCategory {
    Image,
    Video,
    Audio,
    Document,
    Other,
}

impl MediaCategory {
    pub fn from_mime(mime_type: &str) -> Self {
        let mime = mime_type.trim().to_ascii_lowercase();
        match mime.split_once('/') {
            Some(("image", sub)) if !sub.is_empty() => Self::Image,
            Some(("video", sub)) if !sub.is_empty() => Self::Video,
            Some(("audio", sub)) if !sub.is_empty() => Self::Audio,
            Some(("application", "pdf")) => Self::Document,
            _ => Self::Other,
        }
    }

    /// Categories accepted at ingestion.
    pub fn is_permitted(&self) -> bool {
        !matches!(self, Self::Other)
    }
}

/// Output root and master playlist of a finished transcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLocation {
    /// `streams/{id}/master.m3u8`
    pub stream_path: String,
    /// `streams/{id}/`
    pub stream_folder: String,
}

impl StreamLocation {
    pub fn for_asset(id: AssetId) -> Self {
        Self {
            stream_path: format!("{}{}/{}", STREAMS_PREFIX, id, MASTER_MANIFEST_NAME),
            stream_folder: format!("{}{}/", STREAMS_PREFIX, id),
        }
    }
}

/// A stored asset record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Asset {
    pub id: AssetId,
    /// Storage path relative to the storage root, e.g. `uploads/3f2a`.
    pub path: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub original_name: Option<String>,
    pub status: String,
    pub stream_status: StreamStatus,
    pub stream_path: Option<String>,
    pub stream_folder: Option<String>,
    pub thumbnail_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    pub fn category(&self) -> MediaCategory {
        MediaCategory::from_mime(&self.mime_type)
    }

    /// The published stream, if any.
    ///
    /// Stored stream fields are only exposed while the transcode is `ready`,
    /// so a restarted transcode never advertises the previous manifest.
    pub fn stream_location(&self) -> Option<StreamLocation> {
        if self.stream_status != StreamStatus::Ready {
            return None;
        }
        Some(StreamLocation {
            stream_path: self.stream_path.clone()?,
            stream_folder: self.stream_folder.clone()?,
        })
    }
}

/// Fields supplied at ingestion.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAsset {
    pub path: String,
    pub mime_type: String,
    #[serde(default, alias = "size")]
    pub size_bytes: u64,
    #[serde(default)]
    pub original_name: Option<String>,
}

impl NewAsset {
    pub fn new(path: impl Into<String>, mime_type: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            mime_type: mime_type.into(),
            size_bytes,
            original_name: None,
        }
    }

    pub fn with_original_name(mut self, name: impl Into<String>) -> Self {
        self.original_name = Some(name.into());
        self
    }
}

/// A sparse update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetPatch {
    pub status: Option<String>,
    pub thumbnail_path: Option<String>,
    pub stream_status: Option<StreamStatus>,
    pub stream_path: Option<String>,
    pub stream_folder: Option<String>,
}

impl AssetPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_thumbnail_path(mut self, path: impl Into<String>) -> Self {
        self.thumbnail_path = Some(path.into());
        self
    }

    pub fn with_stream_status(mut self, status: StreamStatus) -> Self {
        self.stream_status = Some(status);
        self
    }

    pub fn with_stream_location(mut self, location: StreamLocation) -> Self {
        self.stream_path = Some(location.stream_path);
        self.stream_folder = Some(location.stream_folder);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Stored metadata document for one asset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRecord {
    pub asset_id: AssetId,
    pub document: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}
