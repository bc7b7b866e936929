//! Integration Handlers
//!
//! CRUD, activation toggle, credential validation and connection tests for
//! broker integrations. Every route is scoped to the caller named in the
//! `x-user-id` header.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::info;

use crate::error::error_response;
use crate::handlers::{bad_request, require_owner, ApiError};
use crate::models::health::{ConnectionTestResult, CredentialValidation, ValidateCredentialsRequest};
use crate::models::integration::{
    CreateIntegrationRequest, DeleteIntegrationResponse, IntegrationListQuery,
    IntegrationListResponse, IntegrationResponse, UpdateIntegrationRequest,
};
use crate::AppState;

/// POST /api/integrations
///
/// Credentials are checked for the type's required fields, then stored
/// encrypted. Responds 201 with the new integration.
pub async fn create_integration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateIntegrationRequest>,
) -> Result<(StatusCode, Json<IntegrationResponse>), ApiError> {
    let owner = require_owner(&headers)?;

    let integration = state
        .registry
        .create(&owner, request)
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(IntegrationResponse::from(integration))))
}

/// GET /api/integrations
///
/// # Query Parameters
///
/// - `limit` - Maximum number of results (default: 20, max: 100)
/// - `offset` - Offset for pagination (default: 0)
/// - `isActive` - Only active or only paused integrations
/// - `type` - Only one integration type
///
/// Each entry embeds its five most recent sync attempts as `recentSyncs`.
pub async fn list_integrations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<IntegrationListQuery>,
) -> Result<Json<IntegrationListResponse>, ApiError> {
    let owner = require_owner(&headers)?;
    let (limit, offset) = query.validate().map_err(bad_request)?;

    let (integrations, total) = state
        .registry
        .list(&owner, &query)
        .await
        .map_err(error_response)?;

    info!(count = integrations.len(), total = total, "Integration list returned");

    Ok(Json(IntegrationListResponse {
        integrations,
        total,
        limit,
        offset,
    }))
}

/// GET /api/integrations/{id}
pub async fn get_integration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Result<Json<IntegrationResponse>, ApiError> {
    let owner = require_owner(&headers)?;
    let integration = state.registry.get(id, &owner).await.map_err(error_response)?;
    Ok(Json(IntegrationResponse::from(integration)))
}

/// PATCH /api/integrations/{id}
pub async fn update_integration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Json(request): Json<UpdateIntegrationRequest>,
) -> Result<Json<IntegrationResponse>, ApiError> {
    let owner = require_owner(&headers)?;
    let integration = state
        .registry
        .update(id, &owner, request)
        .await
        .map_err(error_response)?;
    Ok(Json(IntegrationResponse::from(integration)))
}

/// DELETE /api/integrations/{id}
///
/// Removes the integration with all of its sync history.
pub async fn delete_integration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Result<Json<DeleteIntegrationResponse>, ApiError> {
    let owner = require_owner(&headers)?;
    state
        .registry
        .delete(id, &owner)
        .await
        .map_err(error_response)?;
    Ok(Json(DeleteIntegrationResponse { success: true }))
}

/// POST /api/integrations/{id}/toggle
pub async fn toggle_integration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Result<Json<IntegrationResponse>, ApiError> {
    let owner = require_owner(&headers)?;
    let integration = state
        .registry
        .toggle_active(id, &owner)
        .await
        .map_err(error_response)?;
    Ok(Json(IntegrationResponse::from(integration)))
}

/// POST /api/integrations/validate
///
/// Stateless: nothing is stored and no broker is contacted.
pub async fn validate_credentials(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ValidateCredentialsRequest>,
) -> Result<Json<CredentialValidation>, ApiError> {
    require_owner(&headers)?;
    Ok(Json(
        state
            .health
            .validate_credentials(request.integration_type, &request.credentials),
    ))
}

/// POST /api/integrations/{id}/test
///
/// A failed probe is still a 200 with `success: false`.
pub async fn test_connection(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Result<Json<ConnectionTestResult>, ApiError> {
    let owner = require_owner(&headers)?;
    let result = state
        .health
        .test_connection(id, &owner)
        .await
        .map_err(error_response)?;
    Ok(Json(result))
}
