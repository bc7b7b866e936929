//! Sync History & Stats
//!
//! Read-side queries over sync attempts, plus the schedule update which only
//! touches the integration's config.

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    prelude::DateTimeWithTimeZone, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use tracing::info;

use crate::entities::{integrations, prelude::SyncLogs, sync_logs};
use crate::error::IntegrationError;
use crate::models::health::{HealthEventQuery, HealthEventResponse};
use crate::models::sync_log::{
    StatsPeriod, SyncLogQuery, SyncLogResponse, SyncStatsResponse, SyncStatus,
};
use crate::services::config_validation::validate_sync_schedule;
use crate::services::health_ledger;
use crate::services::integration_registry::find_owned;

#[derive(Clone)]
pub struct SyncHistoryService {
    db: DatabaseConnection,
}

impl SyncHistoryService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Page through an integration's attempts, newest first
    pub async fn get_sync_logs(
        &self,
        id: i32,
        owner: &str,
        query: &SyncLogQuery,
    ) -> Result<(Vec<SyncLogResponse>, u64), IntegrationError> {
        let (limit, offset) = query.validate().map_err(IntegrationError::Validation)?;
        find_owned(&self.db, id, owner).await?;

        let mut select = SyncLogs::find().filter(sync_logs::Column::IntegrationId.eq(id));
        if let Some(status) = query.status {
            select = select.filter(sync_logs::Column::Status.eq(status.as_str()));
        }
        if let Some(sync_type) = query.sync_type {
            select = select.filter(sync_logs::Column::SyncType.eq(sync_type.as_str()));
        }

        let total = select.clone().count(&self.db).await?;

        let logs = select
            .order_by_desc(sync_logs::Column::StartedAt)
            .order_by_desc(sync_logs::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok((logs.into_iter().map(SyncLogResponse::from).collect(), total))
    }

    /// Aggregate the attempts started within `[now - period, now]`
    pub async fn get_sync_stats(
        &self,
        id: i32,
        owner: &str,
        period: StatsPeriod,
    ) -> Result<SyncStatsResponse, IntegrationError> {
        find_owned(&self.db, id, owner).await?;

        let now = Utc::now();
        let window_start: DateTimeWithTimeZone = (now - period.duration()).into();
        let window_end: DateTimeWithTimeZone = now.into();

        let logs = SyncLogs::find()
            .filter(sync_logs::Column::IntegrationId.eq(id))
            .filter(sync_logs::Column::StartedAt.gte(window_start))
            .filter(sync_logs::Column::StartedAt.lte(window_end))
            .all(&self.db)
            .await?;

        Ok(compute_stats(&logs, period))
    }

    /// Set or clear the cron schedule. Does not create sync attempts.
    pub async fn update_sync_schedule(
        &self,
        id: i32,
        owner: &str,
        schedule: Option<String>,
    ) -> Result<integrations::Model, IntegrationError> {
        let schedule = schedule
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(ref schedule) = schedule {
            validate_sync_schedule(schedule).map_err(IntegrationError::Validation)?;
        }

        let integration = find_owned(&self.db, id, owner).await?;

        let mut active_model: integrations::ActiveModel = integration.into();
        active_model.sync_schedule = Set(schedule.clone());
        active_model.updated_at = Set(Utc::now().into());
        let updated = active_model.update(&self.db).await?;

        info!(integration_id = id, schedule = ?schedule, "Sync schedule updated");
        Ok(updated)
    }

    pub async fn get_health_events(
        &self,
        id: i32,
        owner: &str,
        query: &HealthEventQuery,
    ) -> Result<(Vec<HealthEventResponse>, u64), IntegrationError> {
        let (limit, offset) = query.validate().map_err(IntegrationError::Validation)?;
        find_owned(&self.db, id, owner).await?;

        let (events, total) = health_ledger::list_events(&self.db, id, limit, offset).await?;
        Ok((events.into_iter().map(HealthEventResponse::from).collect(), total))
    }
}

/// Stats over attempts already restricted to one window
pub fn compute_stats(logs: &[sync_logs::Model], period: StatsPeriod) -> SyncStatsResponse {
    let mut successful = 0u64;
    let mut failed = 0u64;
    let mut total_time = 0i64;
    let mut timed = 0u64;
    let mut total_records = 0i64;
    let mut last_successful: Option<DateTime<FixedOffset>> = None;
    let mut last_failed: Option<DateTime<FixedOffset>> = None;

    for log in logs {
        let last = match log.status.parse::<SyncStatus>() {
            Ok(SyncStatus::Synced) => {
                successful += 1;
                &mut last_successful
            }
            Ok(SyncStatus::Failed) => {
                failed += 1;
                &mut last_failed
            }
            // PENDING (or unknown) counts toward the total only
            _ => continue,
        };

        if let Some(ms) = log.processing_time_ms {
            total_time += ms;
            timed += 1;
        }
        total_records += i64::from(log.records_processed.unwrap_or(0));

        if let Some(completed) = log.completed_at {
            if last.is_none_or(|current| completed > current) {
                *last = Some(completed);
            }
        }
    }

    SyncStatsResponse {
        period: period.as_str().to_string(),
        total_syncs: logs.len() as u64,
        successful_syncs: successful,
        failed_syncs: failed,
        avg_processing_time: (timed > 0).then(|| total_time as f64 / timed as f64),
        total_records_processed: total_records,
        last_successful_sync: last_successful.map(|t| t.to_rfc3339()),
        last_failed_sync: last_failed.map(|t| t.to_rfc3339()),
    }
}
