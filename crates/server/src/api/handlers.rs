use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use mediahub_core::{AssetId, RegistryError, SanitizedConfig, StageError};

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

// ============================================================================
// Errors
// ============================================================================

/// Error body shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn stage_error(err: StageError) -> ApiError {
    let status = match &err {
        StageError::Validation(_) => StatusCode::BAD_REQUEST,
        StageError::NotFound(_) => StatusCode::NOT_FOUND,
        StageError::Conflict(_) => StatusCode::CONFLICT,
        StageError::RegistryUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StageError::ToolFailure(_) | StageError::Timeout(_) | StageError::Cancelled(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, err.to_string())
}

pub fn registry_error(err: RegistryError) -> ApiError {
    let status = match &err {
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::Validation(_) => StatusCode::BAD_REQUEST,
        RegistryError::InvalidTransition { .. } => StatusCode::CONFLICT,
        RegistryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        RegistryError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.to_string())
}

// ============================================================================
// Request helpers
// ============================================================================

/// Asset ids arrive as numbers or numeric strings.
pub fn deserialize_asset_id<'de, D>(deserializer: D) -> Result<Option<AssetId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(AssetId),
        Text(String),
    }

    match Option::<Repr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Repr::Number(id)) => Ok(Some(id)),
        Some(Repr::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Repr::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid asset id: {}", text))),
    }
}

/// Body carrying only an asset id.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIdBody {
    #[serde(default, alias = "id", deserialize_with = "deserialize_asset_id")]
    pub asset_id: Option<AssetId>,
}

pub fn require_asset_id(id: Option<AssetId>) -> Result<AssetId, ApiError> {
    match id {
        Some(id) if id > 0 => Ok(id),
        _ => Err(api_error(StatusCode::BAD_REQUEST, "assetId is required")),
    }
}
