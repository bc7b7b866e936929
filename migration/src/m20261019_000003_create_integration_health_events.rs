//! Migration to create the integration_health_events ledger
//!
//! Append-only record of every event that moved an integration's health fields.

use sea_orm_migration::{prelude::*, schema::*};

use crate::m20261019_000001_create_integrations::Integrations;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IntegrationHealthEvents::Table)
                    .if_not_exists()
                    .col(pk_auto(IntegrationHealthEvents::Id))
                    .col(integer(IntegrationHealthEvents::IntegrationId))
                    .col(string_len(IntegrationHealthEvents::Kind, 32))
                    .col(integer_null(IntegrationHealthEvents::SyncLogId))
                    .col(text_null(IntegrationHealthEvents::Message))
                    .col(
                        timestamp_with_time_zone(IntegrationHealthEvents::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_health_events_integration_id")
                            .from(
                                IntegrationHealthEvents::Table,
                                IntegrationHealthEvents::IntegrationId,
                            )
                            .to(Integrations::Table, Integrations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_health_events_integration_created_at")
                    .table(IntegrationHealthEvents::Table)
                    .col(IntegrationHealthEvents::IntegrationId)
                    .col(IntegrationHealthEvents::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(IntegrationHealthEvents::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
enum IntegrationHealthEvents {
    Table,
    Id,
    IntegrationId,
    Kind,
    SyncLogId,
    Message,
    CreatedAt,
}
