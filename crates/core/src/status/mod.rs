//! Transcode status reporting.
//!
//! The transcode stage never talks to the registry directly. It pushes
//! [`StatusUpdate`]s into a [`StatusOutbox`]; a single [`StatusOutboxWriter`]
//! delivers them in order through a [`StatusSink`], retrying transient
//! failures so an asset is never stranded in `processing`.

mod outbox;
mod sink;

pub use outbox::{create_status_outbox, StatusOutbox, StatusOutboxWriter};
pub use sink::{HttpStatusSink, RegistryStatusSink, StatusSink};

use serde::{Deserialize, Serialize};

use crate::asset::{AssetId, AssetPatch, StreamLocation, StreamStatus};

/// A sparse stream-status update for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    #[serde(alias = "id")]
    pub asset_id: AssetId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_status: Option<StreamStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_folder: Option<String>,
}

impl StatusUpdate {
    pub fn processing(asset_id: AssetId) -> Self {
        Self::with_status(asset_id, StreamStatus::Processing)
    }

    pub fn failed(asset_id: AssetId) -> Self {
        Self::with_status(asset_id, StreamStatus::Failed)
    }

    pub fn ready(asset_id: AssetId, location: StreamLocation) -> Self {
        Self {
            asset_id,
            stream_status: Some(StreamStatus::Ready),
            stream_path: Some(location.stream_path),
            stream_folder: Some(location.stream_folder),
        }
    }

    fn with_status(asset_id: AssetId, status: StreamStatus) -> Self {
        Self {
            asset_id,
            stream_status: Some(status),
            stream_path: None,
            stream_folder: None,
        }
    }

    /// The registry patch carrying exactly the supplied fields.
    pub fn to_patch(&self) -> AssetPatch {
        AssetPatch {
            stream_status: self.stream_status,
            stream_path: self.stream_path.clone(),
            stream_folder: self.stream_folder.clone(),
            ..Default::default()
        }
    }
}
