//! Migration to create the sync_logs table
//!
//! Each row is one sync attempt. PENDING rows double as the durable job record,
//! and the partial unique index keeps at most one of them per integration.

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
                    .table(SyncLogs::Table)
                    .if_not_exists()
                    .col(pk_auto(SyncLogs::Id))
                    .col(integer(SyncLogs::IntegrationId))
                    .col(string_len(SyncLogs::SyncType, 16))
                    .col(string_len(SyncLogs::Status, 16))
                    .col(
                        timestamp_with_time_zone(SyncLogs::StartedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(SyncLogs::CompletedAt))
                    .col(big_integer_null(SyncLogs::ProcessingTimeMs))
                    .col(integer_null(SyncLogs::RecordsProcessed))
                    .col(integer_null(SyncLogs::RecordsSucceeded))
                    .col(integer_null(SyncLogs::RecordsFailed))
                    .col(json_binary_null(SyncLogs::ErrorMessages))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sync_logs_integration_id")
                            .from(SyncLogs::Table, SyncLogs::IntegrationId)
                            .to(Integrations::Table, Integrations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // History and stats queries: integration + time window
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_logs_integration_started_at")
                    .table(SyncLogs::Table)
                    .col(SyncLogs::IntegrationId)
                    .col(SyncLogs::StartedAt)
                    .to_owned(),
            )
            .await?;

        // Reconciliation scans for stale PENDING rows
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_logs_status")
                    .table(SyncLogs::Table)
                    .col(SyncLogs::Status)
                    .to_owned(),
            )
            .await?;

        // Single in-flight attempt per integration. Partial indexes are not
        // expressible through the index builder, same syntax on Postgres and SQLite.
        let db = manager.get_connection();
        db.execute_unprepared(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_logs_single_pending
                ON sync_logs (integration_id)
                WHERE status = 'PENDING';
            "#,
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP INDEX IF EXISTS idx_sync_logs_single_pending;")
            .await?;

        manager
            .drop_table(Table::drop().table(SyncLogs::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SyncLogs {
    Table,
    Id,
    IntegrationId,
    SyncType,
    Status,
    StartedAt,
    CompletedAt,
    ProcessingTimeMs,
    RecordsProcessed,
    RecordsSucceeded,
    RecordsFailed,
    ErrorMessages,
}
