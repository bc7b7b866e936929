//! Sync attempt types, history and stats models
//!
//! Status progresses: PENDING → SYNCED
//!                            ↘ FAILED

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::entities::sync_logs;
use crate::models::pagination::resolve_page;

/// Kind of sync requested from the connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncType {
    /// Resync every record
    Full,
    /// Resync only changes since the last successful sync
    #[default]
    Incremental,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Full => "FULL",
            SyncType::Incremental => "INCREMENTAL",
        }
    }
}

impl std::fmt::Display for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "FULL" => Ok(SyncType::Full),
            "INCREMENTAL" => Ok(SyncType::Incremental),
            _ => Err(format!("Unknown sync type: {}", s)),
        }
    }
}

/// Lifecycle state of a sync attempt. PENDING is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::Synced => "SYNCED",
            SyncStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncStatus::Pending)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(SyncStatus::Pending),
            "SYNCED" => Ok(SyncStatus::Synced),
            "FAILED" => Ok(SyncStatus::Failed),
            _ => Err(format!("Unknown sync status: {}", s)),
        }
    }
}

/// Body for POST /api/integrations/{id}/sync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSyncRequest {
    #[serde(default)]
    pub sync_type: SyncType,
}

/// Query parameters for GET /api/integrations/{id}/logs
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogQuery {
    pub limit: Option<i32>,
    pub offset: Option<i32>,
    pub status: Option<SyncStatus>,
    pub sync_type: Option<SyncType>,
}

impl SyncLogQuery {
    pub fn validate(&self) -> Result<(u64, u64), String> {
        resolve_page(self.limit, self.offset)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogResponse {
    pub id: i32,
    pub integration_id: i32,
    pub sync_type: String,
    pub status: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_processed: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_succeeded: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_failed: Option<i32>,
    pub error_messages: Vec<String>,
}

impl From<sync_logs::Model> for SyncLogResponse {
    fn from(model: sync_logs::Model) -> Self {
        let error_messages = error_messages_of(&model);
        Self {
            id: model.id,
            integration_id: model.integration_id,
            sync_type: model.sync_type,
            status: model.status,
            started_at: model.started_at.to_rfc3339(),
            completed_at: model.completed_at.map(|t| t.to_rfc3339()),
            processing_time_ms: model.processing_time_ms,
            records_processed: model.records_processed,
            records_succeeded: model.records_succeeded,
            records_failed: model.records_failed,
            error_messages,
        }
    }
}

/// Decode the JSON error list stored on a sync log
pub fn error_messages_of(model: &sync_logs::Model) -> Vec<String> {
    model
        .error_messages
        .clone()
        .and_then(|json| serde_json::from_value(json).ok())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogListResponse {
    pub logs: Vec<SyncLogResponse>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

/// Stats window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StatsPeriod {
    #[serde(rename = "7d")]
    #[default]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
    #[serde(rename = "90d")]
    NinetyDays,
}

impl StatsPeriod {
    pub fn duration(&self) -> Duration {
        match self {
            StatsPeriod::SevenDays => Duration::days(7),
            StatsPeriod::ThirtyDays => Duration::days(30),
            StatsPeriod::NinetyDays => Duration::days(90),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatsPeriod::SevenDays => "7d",
            StatsPeriod::ThirtyDays => "30d",
            StatsPeriod::NinetyDays => "90d",
        }
    }
}

impl std::str::FromStr for StatsPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(StatsPeriod::SevenDays),
            "30d" => Ok(StatsPeriod::ThirtyDays),
            "90d" => Ok(StatsPeriod::NinetyDays),
            _ => Err(format!("Unknown period: {} (expected 7d, 30d or 90d)", s)),
        }
    }
}

/// Query parameters for GET /api/integrations/{id}/stats
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncStatsQuery {
    #[serde(default)]
    pub period: StatsPeriod,
}

/// Aggregates over sync attempts started within `[now - period, now]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatsResponse {
    pub period: String,
    /// Every attempt in the window, PENDING included
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    /// Mean processing time of terminal attempts; None when there are none
    pub avg_processing_time: Option<f64>,
    pub total_records_processed: i64,
    /// completed_at of the newest SYNCED attempt inside the window
    pub last_successful_sync: Option<String>,
    /// completed_at of the newest FAILED attempt inside the window
    pub last_failed_sync: Option<String>,
}
