//! SeaORM Entity for integrations table
//!
//! A broker connection owned by a marketplace user. Config columns are written
//! by the registry, health columns only by the sync orchestrator and the
//! connection health monitor.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "integrations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Owning marketplace user
    pub user_id: String,
    /// Upper-snake integration type (e.g. "SKYBOX")
    pub integration_type: String,
    pub name: String,
    /// base64(nonce || AES-256-GCM ciphertext), never plaintext
    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text")]
    pub credentials: String,
    /// Local field -> remote field map
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub field_mappings: Option<Json>,
    /// Versioned preferences document
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub sync_preferences: Option<Json>,
    /// Cron expression read by the external scheduler
    pub sync_schedule: Option<String>,
    pub is_active: bool,
    pub last_sync_at: Option<DateTimeWithTimeZone>,
    /// SYNCED | FAILED
    pub last_sync_status: Option<String>,
    /// Failed syncs and probes since the last SYNCED attempt
    pub error_count: i32,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sync_logs::Entity")]
    SyncLogs,
    #[sea_orm(has_many = "super::integration_health_events::Entity")]
    HealthEvents,
}

impl Related<super::sync_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncLogs.def()
    }
}

impl Related<super::integration_health_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::HealthEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
