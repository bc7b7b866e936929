//! Connection health models: credential validation, probe results and the
//! health event ledger

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::integration_health_events;
use crate::models::integration::IntegrationType;
use crate::models::pagination::resolve_page;

/// Body for POST /api/integrations/validate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCredentialsRequest {
    #[serde(rename = "type")]
    pub integration_type: IntegrationType,
    pub credentials: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialValidation {
    pub valid: bool,
    pub message: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    pub latency_ms: i64,
    pub tested_at: String,
}

/// What moved an integration's health fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthEventKind {
    SyncSynced,
    SyncFailed,
    ProbeSucceeded,
    ProbeFailed,
}

impl HealthEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthEventKind::SyncSynced => "SYNC_SYNCED",
            HealthEventKind::SyncFailed => "SYNC_FAILED",
            HealthEventKind::ProbeSucceeded => "PROBE_SUCCEEDED",
            HealthEventKind::ProbeFailed => "PROBE_FAILED",
        }
    }
}

impl std::fmt::Display for HealthEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthEventQuery {
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

impl HealthEventQuery {
    pub fn validate(&self) -> Result<(u64, u64), String> {
        resolve_page(self.limit, self.offset)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthEventResponse {
    pub id: i32,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_log_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: String,
}

impl From<integration_health_events::Model> for HealthEventResponse {
    fn from(model: integration_health_events::Model) -> Self {
        Self {
            id: model.id,
            kind: model.kind,
            sync_log_id: model.sync_log_id,
            message: model.message,
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthEventListResponse {
    pub events: Vec<HealthEventResponse>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}
