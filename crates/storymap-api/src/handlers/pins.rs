//! Map pin handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use storymap_core::{MapPin, NewPin};

use super::ActionResponse;
use crate::{ApiError, AppState, RequireAdmin};

/// A pin as the map client renders it, with its popup excerpt.
#[derive(Debug, Serialize)]
pub struct PinView {
    #[serde(flatten)]
    pub pin: MapPin,
    pub preview: String,
}

impl From<MapPin> for PinView {
    fn from(pin: MapPin) -> Self {
        let preview = pin.preview();
        Self { pin, preview }
    }
}

/// Every pin, newest first.
pub async fn list_pins(State(state): State<AppState>) -> Result<Json<Vec<PinView>>, ApiError> {
    let pins = state.map.list_pins().await?;
    Ok(Json(pins.into_iter().map(PinView::from).collect()))
}

/// Place a pin that is not backed by a story.
pub async fn create_pin(
    State(state): State<AppState>,
    admin: RequireAdmin,
    payload: Result<Json<NewPin>, JsonRejection>,
) -> Result<(StatusCode, Json<ActionResponse>), ApiError> {
    let Json(req) = payload?;
    let outcome = state.map.create_pin(&admin.actor, req).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// Remove a pin. A story pin's story returns to `approved`.
pub async fn remove_pin(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    let outcome = state.map.remove_pin(&admin.actor, &id).await?;
    Ok(Json(outcome.into()))
}
