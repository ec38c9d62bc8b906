//! # storymap-api
//!
//! HTTP surface for storymap: public map and submission routes plus the
//! administrator review routes, all under `/api/v1`.

pub mod config;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts},
    http::{header, request::Parts, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, warn};
use uuid::Uuid;

use storymap_core::{defaults, Actor, StoryMap};

use crate::handlers::{pins, stories, system};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub map: Arc<StoryMap>,
    /// Bearer token for administrator routes. `None` disables them.
    pub admin_token: Option<Arc<str>>,
    pub allowed_origins: Vec<HeaderValue>,
}

impl AppState {
    pub fn new(map: StoryMap) -> Self {
        Self {
            map: Arc::new(map),
            admin_token: None,
            allowed_origins: Vec::new(),
        }
    }

    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(Arc::from(token.into()));
        self
    }

    pub fn with_allowed_origins(mut self, origins: Vec<HeaderValue>) -> Self {
        self.allowed_origins = origins;
        self
    }
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    Internal(storymap_core::Error),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
}

impl From<storymap_core::Error> for ApiError {
    fn from(err: storymap_core::Error) -> Self {
        use storymap_core::Error;
        match err {
            Error::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            Error::InvalidTransition(rejection) => ApiError::Conflict(rejection.to_string()),
            e @ (Error::Validation(_) | Error::MissingField(_)) => {
                ApiError::BadRequest(validation_message(&e))
            }
            other => ApiError::Internal(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

fn validation_message(err: &storymap_core::Error) -> String {
    match err {
        storymap_core::Error::Validation(msg) => msg.clone(),
        storymap_core::Error::MissingField(field) => format!("{} is required", field),
        other => other.to_string(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(err) => {
                error!(subsystem = "api", error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

// =============================================================================
// AUTHENTICATION
// =============================================================================

/// Extractor for administrator routes.
///
/// Accepts `Authorization: Bearer <ADMIN_TOKEN>` and yields the acting
/// [`Actor`]. The optional `X-Admin-User` header names the administrator in
/// logs; it defaults to `admin`.
#[derive(Debug, Clone)]
pub struct RequireAdmin {
    pub actor: Actor,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_token.as_deref() else {
            warn!(subsystem = "api", "Admin request refused: ADMIN_TOKEN not configured");
            return Err(ApiError::Forbidden(
                "Administrator access is not configured".to_string(),
            ));
        };

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);

        match token {
            Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => {
                let id = parts
                    .headers
                    .get("x-admin-user")
                    .and_then(|v| v.to_str().ok())
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .unwrap_or("admin");
                Ok(RequireAdmin {
                    actor: Actor::new(id),
                })
            }
            _ => Err(ApiError::Unauthorized(
                "Administrator authentication required".to_string(),
            )),
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// =============================================================================
// ROUTER
// =============================================================================

#[derive(Clone, Copy)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the application router with its middleware stack.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/stories",
            get(stories::list_stories).post(stories::submit_story),
        )
        .route(
            "/stories/:id",
            get(stories::story_detail).delete(stories::delete_story),
        )
        .route("/stories/:id/approve", post(stories::approve_story))
        .route("/stories/:id/reject", post(stories::reject_story))
        .route("/stories/:id/publish", post(stories::publish_story))
        .route(
            "/stories/:id/approve-and-publish",
            post(stories::approve_and_publish),
        )
        .route("/stories/:id/unpublish", post(stories::unpublish_story))
        .route("/pins", get(pins::list_pins).post(pins::create_pin))
        .route("/pins/:id", delete(pins::remove_pin))
        .route("/admin/storage", get(system::storage_report));

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(state.allowed_origins.clone()))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(defaults::CORS_MAX_AGE_SECS));

    Router::new()
        .route("/health", get(system::health_check))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(defaults::MAX_BODY_SIZE_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
    }

    #[test]
    fn test_core_errors_map_to_status() {
        use storymap_core::Error;
        let status = |e: Error| ApiError::from(e).into_response().status();
        assert_eq!(status(Error::NotFound("story x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(Error::MissingField("title")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(Error::Validation("lat out of range".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(Error::Storage("connection reset".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
