//! Migration to create the integrations table
//!
//! One row per broker connection owned by a marketplace user. Credentials are
//! stored as an encrypted, base64-encoded blob.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Integrations::Table)
                    .if_not_exists()
                    .col(pk_auto(Integrations::Id))
                    .col(string_len(Integrations::UserId, 128))
                    .col(string_len(Integrations::IntegrationType, 32))
                    .col(string(Integrations::Name))
                    .col(text(Integrations::Credentials))
                    .col(json_binary_null(Integrations::FieldMappings))
                    .col(json_binary_null(Integrations::SyncPreferences))
                    .col(string_null(Integrations::SyncSchedule))
                    .col(boolean(Integrations::IsActive).default(true))
                    .col(timestamp_with_time_zone_null(Integrations::LastSyncAt))
                    .col(string_len_null(Integrations::LastSyncStatus, 16))
                    .col(integer(Integrations::ErrorCount).default(0))
                    .col(
                        timestamp_with_time_zone(Integrations::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Integrations::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Every read is scoped by owner
        manager
            .create_index(
                Index::create()
                    .name("idx_integrations_user_id")
                    .table(Integrations::Table)
                    .col(Integrations::UserId)
                    .to_owned(),
            )
            .await?;

        // Dashboard filter: owner + type
        manager
            .create_index(
                Index::create()
                    .name("idx_integrations_user_type")
                    .table(Integrations::Table)
                    .col(Integrations::UserId)
                    .col(Integrations::IntegrationType)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Integrations::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub(crate) enum Integrations {
    Table,
    Id,
    UserId,
    IntegrationType,
    Name,
    Credentials,
    FieldMappings,
    SyncPreferences,
    SyncSchedule,
    IsActive,
    LastSyncAt,
    LastSyncStatus,
    ErrorCount,
    CreatedAt,
    UpdatedAt,
}
