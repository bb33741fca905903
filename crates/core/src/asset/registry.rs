//! Asset registry trait and error type.

use thiserror::Error;

use super::{Asset, AssetId, AssetPatch, MetadataRecord, NewAsset, StreamStatus};

/// Error type for registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Asset not found: {0}")]
    NotFound(AssetId),

    /// The stream status transition is not in the transition table.
    #[error("Asset {asset_id}: cannot move stream status from {from} to {to}")]
    InvalidTransition {
        asset_id: AssetId,
        from: StreamStatus,
        to: StreamStatus,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    /// The registry could not be reached (remote registry).
    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

impl RegistryError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Unavailable(_))
    }
}

/// Durable store of asset records and their metadata documents.
pub trait AssetRegistry: Send + Sync {
    /// Create a record at status `new`. Rejects MIME types outside the
    /// permitted set without writing anything.
    fn create(&self, asset: NewAsset) -> Result<Asset, RegistryError>;

    fn get(&self, id: AssetId) -> Result<Option<Asset>, RegistryError>;

    /// Merge the supplied fields into the record; omitted fields keep their
    /// stored value. A stream status change is checked against the
    /// transition table.
    fn update(&self, id: AssetId, patch: AssetPatch) -> Result<Asset, RegistryError>;

    /// Create or wholesale replace the metadata document.
    fn upsert_metadata(
        &self,
        id: AssetId,
        document: serde_json::Value,
    ) -> Result<MetadataRecord, RegistryError>;

    fn get_metadata(&self, id: AssetId) -> Result<Option<MetadataRecord>, RegistryError>;
}
