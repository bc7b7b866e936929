pub mod integrations;
pub mod sync;

use axum::{
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use tracing::warn;

use crate::models::error::ErrorResponse;
use crate::AppState;

/// Header carrying the authenticated caller, set by the upstream gateway
pub const OWNER_HEADER: &str = "x-user-id";

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// All integration endpoints under /api/integrations
pub fn integration_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/integrations",
            post(integrations::create_integration).get(integrations::list_integrations),
        )
        .route(
            "/api/integrations/validate",
            post(integrations::validate_credentials),
        )
        .route(
            "/api/integrations/{id}",
            get(integrations::get_integration)
                .patch(integrations::update_integration)
                .delete(integrations::delete_integration),
        )
        .route(
            "/api/integrations/{id}/toggle",
            post(integrations::toggle_integration),
        )
        .route("/api/integrations/{id}/test", post(integrations::test_connection))
        .route("/api/integrations/{id}/sync", post(sync::trigger_sync))
        .route("/api/integrations/{id}/logs", get(sync::get_sync_logs))
        .route("/api/integrations/{id}/stats", get(sync::get_sync_stats))
        .route("/api/integrations/{id}/schedule", put(sync::update_sync_schedule))
        .route(
            "/api/integrations/{id}/health-events",
            get(sync::get_health_events),
        )
}

/// Resolve the calling owner from the request headers
pub fn require_owner(headers: &HeaderMap) -> Result<String, ApiError> {
    let owner = headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("");

    if owner.is_empty() {
        warn!("Missing caller identity header");
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: format!("Missing {} header", OWNER_HEADER),
                code: "UNAUTHORIZED".to_string(),
            }),
        ));
    }

    Ok(owner.to_string())
}

pub(crate) fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            code: "VALIDATION_ERROR".to_string(),
        }),
    )
}
