//! Append-only ledger of integration health events
//!
//! Every change to an integration's health fields is recorded here in the same
//! transaction, so the single `error_count` integer can be audited back to the
//! probes and syncs that produced it.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use crate::entities::{integration_health_events, prelude::IntegrationHealthEvents};
use crate::models::health::HealthEventKind;

/// Record one health event
pub async fn record_event<C: ConnectionTrait>(
    conn: &C,
    integration_id: i32,
    kind: HealthEventKind,
    sync_log_id: Option<i32>,
    message: Option<String>,
) -> Result<integration_health_events::Model, sea_orm::DbErr> {
    let event = integration_health_events::ActiveModel {
        integration_id: Set(integration_id),
        kind: Set(kind.to_string()),
        sync_log_id: Set(sync_log_id),
        message: Set(message),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    };

    let inserted = event.insert(conn).await?;
    tracing::debug!(
        integration_id = integration_id,
        kind = %kind,
        sync_log_id = ?sync_log_id,
        "Recorded health event"
    );
    Ok(inserted)
}

/// Page through an integration's events, newest first
pub async fn list_events<C: ConnectionTrait>(
    conn: &C,
    integration_id: i32,
    limit: u64,
    offset: u64,
) -> Result<(Vec<integration_health_events::Model>, u64), sea_orm::DbErr> {
    let select = IntegrationHealthEvents::find()
        .filter(integration_health_events::Column::IntegrationId.eq(integration_id));

    let total = select.clone().count(conn).await?;

    let events = select
        .order_by_desc(integration_health_events::Column::CreatedAt)
        .order_by_desc(integration_health_events::Column::Id)
        .offset(offset)
        .limit(limit)
        .all(conn)
        .await?;

    Ok((events, total))
}
