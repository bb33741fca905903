//! Asset registration and read endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use mediahub_core::{
    dispatcher::DispatchTarget, Asset, AssetId, NewAsset, StreamStatus,
};

use super::handlers::{api_error, registry_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredResponse {
    pub message: String,
    pub file_id: AssetId,
}

/// Asset as clients see it. Stream fields appear only once the stream is ready.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetResponse {
    pub id: AssetId,
    pub path: String,
    pub mime_type: String,
    pub size: u64,
    pub original_name: Option<String>,
    pub status: String,
    pub stream_status: StreamStatus,
    pub stream_path: Option<String>,
    pub stream_folder: Option<String>,
    pub thumbnail_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Asset> for AssetResponse {
    fn from(asset: Asset) -> Self {
        let location = asset.stream_location();
        Self {
            id: asset.id,
            path: asset.path,
            mime_type: asset.mime_type,
            size: asset.size_bytes,
            original_name: asset.original_name,
            status: asset.status,
            stream_status: asset.stream_status,
            stream_path: location.as_ref().map(|l| l.stream_path.clone()),
            stream_folder: location.map(|l| l.stream_folder),
            thumbnail_path: asset.thumbnail_path,
            created_at: asset.created_at.to_rfc3339(),
            updated_at: asset.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataResponse {
    pub asset_id: AssetId,
    pub metadata: Value,
    pub updated_at: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Register a stored upload and fan out derivation work.
///
/// Returns as soon as the record exists; stage outcomes never reach the caller.
pub async fn register_asset(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewAsset>,
) -> Result<(StatusCode, Json<RegisteredResponse>), ApiError> {
    let asset = state.registry().create(body).map_err(registry_error)?;

    info!(
        asset_id = asset.id,
        mime_type = %asset.mime_type,
        path = %asset.path,
        "Asset registered"
    );

    // Delivery tasks run detached from this request.
    let _receipt = state.dispatcher().dispatch(&DispatchTarget::from(&asset));

    Ok((
        StatusCode::CREATED,
        Json(RegisteredResponse {
            message: "File uploaded successfully".to_string(),
            file_id: asset.id,
        }),
    ))
}

pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AssetId>,
) -> Result<Json<AssetResponse>, ApiError> {
    match state.registry().get(id).map_err(registry_error)? {
        Some(asset) => Ok(Json(AssetResponse::from(asset))),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Asset not found: {}", id),
        )),
    }
}

pub async fn get_asset_metadata(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AssetId>,
) -> Result<Json<MetadataResponse>, ApiError> {
    match state.registry().get_metadata(id).map_err(registry_error)? {
        Some(record) => Ok(Json(MetadataResponse {
            asset_id: record.asset_id,
            metadata: record.document,
            updated_at: record.updated_at.to_rfc3339(),
        })),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("No metadata for asset {}", id),
        )),
    }
}
