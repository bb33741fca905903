//! Registry endpoint for stream status reports.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use mediahub_core::{AssetId, AssetPatch, StreamStatus};

use super::handlers::{
    api_error, deserialize_asset_id, registry_error, require_asset_id, ApiError,
};
use crate::state::AppState;

/// Sparse stream update. Omitted fields keep their stored value.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatusBody {
    #[serde(default, alias = "id", deserialize_with = "deserialize_asset_id")]
    pub asset_id: Option<AssetId>,
    #[serde(default)]
    pub stream_status: Option<StreamStatus>,
    #[serde(default)]
    pub stream_path: Option<String>,
    #[serde(default)]
    pub stream_folder: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn update_stream_status(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StreamStatusBody>,
) -> Result<Json<MessageResponse>, ApiError> {
    let asset_id = require_asset_id(body.asset_id)?;

    let patch = AssetPatch {
        stream_status: body.stream_status,
        stream_path: body.stream_path,
        stream_folder: body.stream_folder,
        ..Default::default()
    };
    if patch.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "No fields to update"));
    }

    let asset = state
        .registry()
        .update(asset_id, patch)
        .map_err(registry_error)?;

    debug!(
        asset_id,
        stream_status = %asset.stream_status,
        "Stream status updated"
    );

    Ok(Json(MessageResponse {
        message: "Stream status updated successfully".to_string(),
    }))
}
