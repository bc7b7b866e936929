//! Integration request/response models and the integration type catalogue

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::entities::integrations;
use crate::models::pagination::resolve_page;
use crate::models::sync_log::SyncLogResponse;

/// Broker platforms an integration can connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationType {
    Skybox,
    AutoProcessor,
    TicketEvolution,
    TicketNetwork,
    CustomApi,
}

impl IntegrationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationType::Skybox => "SKYBOX",
            IntegrationType::AutoProcessor => "AUTO_PROCESSOR",
            IntegrationType::TicketEvolution => "TICKET_EVOLUTION",
            IntegrationType::TicketNetwork => "TICKET_NETWORK",
            IntegrationType::CustomApi => "CUSTOM_API",
        }
    }

    /// Credential keys that must be present (as non-empty strings)
    pub fn required_credential_keys(&self) -> &'static [&'static str] {
        match self {
            IntegrationType::Skybox => &["apiToken", "accountId"],
            IntegrationType::AutoProcessor => &["apiKey"],
            IntegrationType::TicketEvolution => &["apiToken", "apiSecret"],
            IntegrationType::TicketNetwork => &["brokerId", "apiKey"],
            IntegrationType::CustomApi => &["baseUrl", "apiKey"],
        }
    }

    /// Permissions a valid credential set grants on the broker side
    pub fn granted_permissions(&self) -> &'static [&'static str] {
        match self {
            IntegrationType::Skybox => &["inventory:read", "inventory:write", "sales:read"],
            IntegrationType::AutoProcessor => &["orders:read", "fulfillment:write"],
            IntegrationType::TicketEvolution => {
                &["inventory:read", "inventory:write", "orders:read"]
            }
            IntegrationType::TicketNetwork => &["inventory:read", "orders:read"],
            IntegrationType::CustomApi => &["inventory:read"],
        }
    }
}

impl std::fmt::Display for IntegrationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IntegrationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SKYBOX" => Ok(IntegrationType::Skybox),
            "AUTO_PROCESSOR" => Ok(IntegrationType::AutoProcessor),
            "TICKET_EVOLUTION" => Ok(IntegrationType::TicketEvolution),
            "TICKET_NETWORK" => Ok(IntegrationType::TicketNetwork),
            "CUSTOM_API" => Ok(IntegrationType::CustomApi),
            _ => Err(format!("Unknown integration type: {}", s)),
        }
    }
}

/// Body for POST /api/integrations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntegrationRequest {
    #[serde(rename = "type")]
    pub integration_type: IntegrationType,
    pub name: String,
    /// Opaque, type-specific credential object
    pub credentials: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_mappings: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_preferences: Option<Value>,
}

/// Body for PATCH /api/integrations/{id}. Only config fields can change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIntegrationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_schedule: Option<String>,
    /// `null` clears the stored mappings
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub field_mappings: Option<Option<Value>>,
    /// `null` clears the stored preferences
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub sync_preferences: Option<Option<Value>>,
}

/// Tell an explicit `null` (`Some(None)`) apart from an absent field (`None`)
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UpdateIntegrationRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.credentials.is_none()
            && self.sync_schedule.is_none()
            && self.field_mappings.is_none()
            && self.sync_preferences.is_none()
    }
}

/// Body for PUT /api/integrations/{id}/schedule. `null` clears the schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScheduleRequest {
    pub sync_schedule: Option<String>,
}

/// Query parameters for GET /api/integrations
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationListQuery {
    /// Maximum number of results (default: 20, max: 100)
    pub limit: Option<i32>,
    /// Offset for pagination (default: 0)
    pub offset: Option<i32>,
    pub is_active: Option<bool>,
    #[serde(rename = "type")]
    pub integration_type: Option<IntegrationType>,
}

impl IntegrationListQuery {
    pub fn validate(&self) -> Result<(u64, u64), String> {
        resolve_page(self.limit, self.offset)
    }
}

/// Integration as returned to its owner. Credentials are never included.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationResponse {
    pub id: i32,
    pub user_id: String,
    #[serde(rename = "type")]
    pub integration_type: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_mappings: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_preferences: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_schedule: Option<String>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_status: Option<String>,
    pub error_count: i32,
    pub created_at: String,
    pub updated_at: String,
    /// Five most recent sync attempts, only populated on list responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_syncs: Option<Vec<SyncLogResponse>>,
}

impl IntegrationResponse {
    pub fn with_recent_syncs(mut self, recent: Vec<SyncLogResponse>) -> Self {
        self.recent_syncs = Some(recent);
        self
    }
}

impl From<integrations::Model> for IntegrationResponse {
    fn from(model: integrations::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            integration_type: model.integration_type,
            name: model.name,
            field_mappings: model.field_mappings,
            sync_preferences: model.sync_preferences,
            sync_schedule: model.sync_schedule,
            is_active: model.is_active,
            last_sync_at: model.last_sync_at.map(|t| t.to_rfc3339()),
            last_sync_status: model.last_sync_status,
            error_count: model.error_count,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
            recent_syncs: None,
        }
    }
}

/// Response for GET /api/integrations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationListResponse {
    pub integrations: Vec<IntegrationResponse>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteIntegrationResponse {
    pub success: bool,
}
