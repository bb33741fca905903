//! Stage endpoints: thumbnail, metadata and transcode.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use mediahub_core::{
    transcode::{InflightTranscode, TranscodeRequest},
    AssetId, MetadataOutcome, ThumbnailOutcome,
};

use super::handlers::{
    api_error, deserialize_asset_id, require_asset_id, stage_error, ApiError, AssetIdBody,
};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MetadataStageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeBody {
    #[serde(default, alias = "id", deserialize_with = "deserialize_asset_id")]
    pub asset_id: Option<AssetId>,
    #[serde(default)]
    pub storage_path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeAccepted {
    pub message: String,
    pub asset_id: AssetId,
}

#[derive(Debug, Serialize)]
pub struct InflightResponse {
    pub transcodes: Vec<InflightTranscode>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn generate_thumbnail(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AssetIdBody>,
) -> Result<Json<ThumbnailResponse>, ApiError> {
    let asset_id = require_asset_id(body.asset_id)?;

    let response = match state.thumbnail().run(asset_id).await.map_err(stage_error)? {
        ThumbnailOutcome::Created(thumb) => ThumbnailResponse {
            message: "Thumbnail generated successfully".to_string(),
            thumbnail_path: Some(thumb.thumbnail_path),
        },
        ThumbnailOutcome::Unsupported => ThumbnailResponse {
            message: "Thumbnail not supported for this file type".to_string(),
            thumbnail_path: None,
        },
    };
    Ok(Json(response))
}

pub async fn extract_metadata(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AssetIdBody>,
) -> Result<Json<MetadataStageResponse>, ApiError> {
    let asset_id = require_asset_id(body.asset_id)?;

    let response = match state.metadata().run(asset_id).await.map_err(stage_error)? {
        MetadataOutcome::Extracted(metadata) => MetadataStageResponse {
            message: "Metadata extracted successfully".to_string(),
            metadata: Some(metadata),
        },
        MetadataOutcome::Unsupported => MetadataStageResponse {
            message: "No metadata extracted for this file type".to_string(),
            metadata: None,
        },
    };
    Ok(Json(response))
}

/// Accept a transcode. Passes run in the background; clients poll the asset.
pub async fn start_transcode(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TranscodeBody>,
) -> Result<(StatusCode, Json<TranscodeAccepted>), ApiError> {
    let asset_id = require_asset_id(body.asset_id)?;
    let storage_path = body
        .storage_path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "storagePath is required"))?;

    state
        .transcode()
        .submit(TranscodeRequest::new(asset_id, storage_path))
        .await
        .map_err(stage_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TranscodeAccepted {
            message: "Transcoding started".to_string(),
            asset_id,
        }),
    ))
}

pub async fn list_transcodes(State(state): State<Arc<AppState>>) -> Json<InflightResponse> {
    Json(InflightResponse {
        transcodes: state.transcode().inflight().active(),
    })
}

pub async fn cancel_transcode(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AssetId>,
) -> Result<(StatusCode, Json<TranscodeAccepted>), ApiError> {
    if state.transcode().inflight().cancel(id) {
        Ok((
            StatusCode::ACCEPTED,
            Json(TranscodeAccepted {
                message: "Transcode cancellation requested".to_string(),
                asset_id: id,
            }),
        ))
    } else {
        Err(api_error(
            StatusCode::NOT_FOUND,
            format!("No transcode in progress for asset {}", id),
        ))
    }
}
