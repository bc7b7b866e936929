//! SeaORM Entity for sync_logs table
//!
//! One row per sync attempt. Created PENDING, moved to SYNCED or FAILED exactly
//! once.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub integration_id: i32,
    /// FULL | INCREMENTAL
    pub sync_type: String,
    /// PENDING | SYNCED | FAILED
    pub status: String,
    pub started_at: DateTimeWithTimeZone,
    pub completed_at: Option<DateTimeWithTimeZone>,
    pub processing_time_ms: Option<i64>,
    pub records_processed: Option<i32>,
    pub records_succeeded: Option<i32>,
    pub records_failed: Option<i32>,
    /// JSON array of strings, only set on FAILED
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub error_messages: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::integrations::Entity",
        from = "Column::IntegrationId",
        to = "super::integrations::Column::Id",
        on_delete = "Cascade"
    )]
    Integration,
}

impl Related<super::integrations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Integration.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
