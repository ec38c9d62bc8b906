//! Health and storage diagnostics.

use axum::{extract::State, response::IntoResponse, Json};

use storymap_core::StorageReport;

use crate::{ApiError, AppState, RequireAdmin};

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "shape": state.map.shape(),
    }))
}

/// Backend name, storage shape, missing optional columns and row counts.
pub async fn storage_report(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<Json<StorageReport>, ApiError> {
    Ok(Json(state.map.storage_report().await?))
}
