//! Story submission, public detail and administrator review handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use storymap_core::{NewStory, Placement, StoryDetail, StoryRecord};

use super::ActionResponse;
use crate::{ApiError, AppState, RequireAdmin};

/// All stories, newest submission first.
pub async fn list_stories(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<Json<Vec<StoryRecord>>, ApiError> {
    Ok(Json(state.map.list_stories().await?))
}

/// Public submission. The story starts `pending`.
pub async fn submit_story(
    State(state): State<AppState>,
    payload: Result<Json<NewStory>, JsonRejection>,
) -> Result<(StatusCode, Json<StoryRecord>), ApiError> {
    let Json(req) = payload?;
    let story = state.map.submit_story(req).await?;
    info!(
        subsystem = "api",
        op = "submit_story",
        story_id = %story.id,
        "Story submitted"
    );
    Ok((StatusCode::CREATED, Json(story)))
}

/// Public detail for a pin or an approved story.
pub async fn story_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoryDetail>, ApiError> {
    Ok(Json(state.map.story_detail(&id).await?))
}

pub async fn approve_story(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    let outcome = state.map.approve_story(&admin.actor, &id).await?;
    Ok(Json(outcome.into()))
}

pub async fn reject_story(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    let outcome = state.map.reject_story(&admin.actor, &id).await?;
    Ok(Json(outcome.into()))
}

/// Optional `{ "lat": .., "lng": .. }` body. No JSON body means the
/// location is geocoded.
fn placement(payload: Result<Json<Placement>, JsonRejection>) -> Result<Placement, ApiError> {
    match payload {
        Ok(Json(placement)) => Ok(placement),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(Placement::default()),
        Err(rejection) => Err(rejection.into()),
    }
}

/// Publish an approved story as a pin.
pub async fn publish_story(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Path(id): Path<String>,
    payload: Result<Json<Placement>, JsonRejection>,
) -> Result<Json<ActionResponse>, ApiError> {
    let placement = placement(payload)?;
    let outcome = state
        .map
        .publish_story_at(&admin.actor, &id, placement)
        .await?;
    Ok(Json(outcome.into()))
}

pub async fn approve_and_publish(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Path(id): Path<String>,
    payload: Result<Json<Placement>, JsonRejection>,
) -> Result<Json<ActionResponse>, ApiError> {
    let placement = placement(payload)?;
    let outcome = state
        .map
        .approve_and_publish_at(&admin.actor, &id, placement)
        .await?;
    Ok(Json(outcome.into()))
}

/// Take a story off the map; it returns to `approved`.
pub async fn unpublish_story(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    let outcome = state.map.unpublish_story(&admin.actor, &id).await?;
    Ok(Json(outcome.into()))
}

pub async fn delete_story(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    let outcome = state.map.delete_story(&admin.actor, &id).await?;
    Ok(Json(outcome.into()))
}
