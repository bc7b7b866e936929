//! Sync Handlers
//!
//! Triggering syncs, sync history, stats, schedules and the health ledger.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::info;

use crate::error::error_response;
use crate::handlers::{bad_request, require_owner, ApiError};
use crate::models::health::{HealthEventListResponse, HealthEventQuery};
use crate::models::integration::{IntegrationResponse, UpdateScheduleRequest};
use crate::models::sync_log::{
    SyncLogListResponse, SyncLogQuery, SyncLogResponse, SyncStatsQuery, SyncStatsResponse,
    TriggerSyncRequest,
};
use crate::AppState;

/// POST /api/integrations/{id}/sync
///
/// Responds 202 with the PENDING attempt; the result is recorded on the
/// attempt once the connector finishes. Body is optional:
///
/// ```json
/// { "syncType": "FULL" }
/// ```
///
/// `syncType` defaults to INCREMENTAL.
pub async fn trigger_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    body: Option<Json<TriggerSyncRequest>>,
) -> Result<(StatusCode, Json<SyncLogResponse>), ApiError> {
    let owner = require_owner(&headers)?;
    let sync_type = body.map(|Json(req)| req.sync_type).unwrap_or_default();

    let attempt = state
        .orchestrator
        .trigger_sync(id, &owner, sync_type)
        .await
        .map_err(error_response)?;

    info!(integration_id = id, sync_log_id = attempt.id, "Sync accepted");
    Ok((StatusCode::ACCEPTED, Json(SyncLogResponse::from(attempt))))
}

/// GET /api/integrations/{id}/logs
///
/// # Query Parameters
///
/// - `limit` - Maximum number of results (default: 20, max: 100)
/// - `offset` - Offset for pagination (default: 0)
/// - `status` - PENDING, SYNCED or FAILED
/// - `syncType` - FULL or INCREMENTAL
pub async fn get_sync_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Query(query): Query<SyncLogQuery>,
) -> Result<Json<SyncLogListResponse>, ApiError> {
    let owner = require_owner(&headers)?;
    let (limit, offset) = query.validate().map_err(bad_request)?;

    let (logs, total) = state
        .history
        .get_sync_logs(id, &owner, &query)
        .await
        .map_err(error_response)?;

    Ok(Json(SyncLogListResponse {
        logs,
        total,
        limit,
        offset,
    }))
}

/// GET /api/integrations/{id}/stats?period=7d|30d|90d
pub async fn get_sync_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Query(query): Query<SyncStatsQuery>,
) -> Result<Json<SyncStatsResponse>, ApiError> {
    let owner = require_owner(&headers)?;
    let stats = state
        .history
        .get_sync_stats(id, &owner, query.period)
        .await
        .map_err(error_response)?;
    Ok(Json(stats))
}

/// PUT /api/integrations/{id}/schedule
pub async fn update_sync_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<IntegrationResponse>, ApiError> {
    let owner = require_owner(&headers)?;
    let integration = state
        .history
        .update_sync_schedule(id, &owner, request.sync_schedule)
        .await
        .map_err(error_response)?;
    Ok(Json(IntegrationResponse::from(integration)))
}

/// GET /api/integrations/{id}/health-events
pub async fn get_health_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Query(query): Query<HealthEventQuery>,
) -> Result<Json<HealthEventListResponse>, ApiError> {
    let owner = require_owner(&headers)?;
    let (limit, offset) = query.validate().map_err(bad_request)?;

    let (events, total) = state
        .history
        .get_health_events(id, &owner, &query)
        .await
        .map_err(error_response)?;

    Ok(Json(HealthEventListResponse {
        events,
        total,
        limit,
        offset,
    }))
}
