//! Integration Registry
//!
//! Owns creation, update, deletion and listing of integrations and their
//! credential/mapping configuration. Ownership is the only authorization
//! boundary: an integration owned by someone else is reported as not found.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    prelude::{DateTimeWithTimeZone, Expr},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::info;

use crate::entities::{
    integration_health_events, integrations,
    prelude::{IntegrationHealthEvents, Integrations, SyncLogs},
    sync_logs,
};
use crate::error::IntegrationError;
use crate::models::integration::{
    CreateIntegrationRequest, IntegrationListQuery, IntegrationResponse, IntegrationType,
    UpdateIntegrationRequest,
};
use crate::models::sync_log::SyncLogResponse;
use crate::services::config_validation::{
    validate_credentials, validate_field_mappings, validate_name, validate_sync_preferences,
    validate_sync_schedule,
};
use crate::services::credential_cipher::{seal_credentials, CredentialCipher};

/// Sync attempts embedded per integration on list responses
pub const RECENT_SYNCS_PER_INTEGRATION: u64 = 5;

/// Load an integration, scoped to its owner
pub async fn find_owned<C: ConnectionTrait>(
    conn: &C,
    id: i32,
    owner: &str,
) -> Result<integrations::Model, IntegrationError> {
    Integrations::find_by_id(id)
        .filter(integrations::Column::UserId.eq(owner))
        .one(conn)
        .await?
        .ok_or(IntegrationError::NotFound)
}

#[derive(Clone)]
pub struct IntegrationRegistry {
    db: DatabaseConnection,
    cipher: Arc<dyn CredentialCipher>,
}

impl IntegrationRegistry {
    pub fn new(db: DatabaseConnection, cipher: Arc<dyn CredentialCipher>) -> Self {
        Self { db, cipher }
    }

    /// Register a new integration. Starts active with a clean health record.
    pub async fn create(
        &self,
        owner: &str,
        request: CreateIntegrationRequest,
    ) -> Result<integrations::Model, IntegrationError> {
        validate_name(&request.name).map_err(IntegrationError::Validation)?;
        check_config_documents(
            request.sync_schedule.as_deref(),
            request.field_mappings.as_ref(),
            request.sync_preferences.as_ref(),
        )?;

        let validation = validate_credentials(request.integration_type, &request.credentials);
        if !validation.valid {
            return Err(IntegrationError::Connection(validation.message));
        }

        let sealed = seal_credentials(self.cipher.as_ref(), &request.credentials)?;
        let now = Utc::now();

        let integration = integrations::ActiveModel {
            user_id: Set(owner.to_string()),
            integration_type: Set(request.integration_type.to_string()),
            name: Set(request.name.trim().to_string()),
            credentials: Set(sealed),
            field_mappings: Set(request.field_mappings),
            sync_preferences: Set(request.sync_preferences),
            sync_schedule: Set(request.sync_schedule.map(|s| s.trim().to_string())),
            is_active: Set(true),
            last_sync_at: Set(None),
            last_sync_status: Set(None),
            error_count: Set(0),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        info!(
            integration_id = integration.id,
            integration_type = %integration.integration_type,
            "Integration created"
        );
        Ok(integration)
    }

    pub async fn get(&self, id: i32, owner: &str) -> Result<integrations::Model, IntegrationError> {
        find_owned(&self.db, id, owner).await
    }

    /// Page through the owner's integrations, newest first, each with its most
    /// recent sync attempts embedded
    pub async fn list(
        &self,
        owner: &str,
        query: &IntegrationListQuery,
    ) -> Result<(Vec<IntegrationResponse>, u64), IntegrationError> {
        let (limit, offset) = query.validate().map_err(IntegrationError::Validation)?;

        let mut select = Integrations::find().filter(integrations::Column::UserId.eq(owner));
        if let Some(active) = query.is_active {
            select = select.filter(integrations::Column::IsActive.eq(active));
        }
        if let Some(integration_type) = query.integration_type {
            select =
                select.filter(integrations::Column::IntegrationType.eq(integration_type.as_str()));
        }

        let total = select.clone().count(&self.db).await?;

        let rows = select
            .order_by_desc(integrations::Column::CreatedAt)
            .order_by_desc(integrations::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for integration in rows {
            let recent = SyncLogs::find()
                .filter(sync_logs::Column::IntegrationId.eq(integration.id))
                .order_by_desc(sync_logs::Column::StartedAt)
                .order_by_desc(sync_logs::Column::Id)
                .limit(RECENT_SYNCS_PER_INTEGRATION)
                .all(&self.db)
                .await?;

            entries.push(
                IntegrationResponse::from(integration)
                    .with_recent_syncs(recent.into_iter().map(SyncLogResponse::from).collect()),
            );
        }

        Ok((entries, total))
    }

    /// Update config fields. Health fields cannot be changed from here.
    pub async fn update(
        &self,
        id: i32,
        owner: &str,
        request: UpdateIntegrationRequest,
    ) -> Result<integrations::Model, IntegrationError> {
        let integration = find_owned(&self.db, id, owner).await?;
        if request.is_empty() {
            return Ok(integration);
        }

        if let Some(ref name) = request.name {
            validate_name(name).map_err(IntegrationError::Validation)?;
        }
        check_config_documents(
            request.sync_schedule.as_deref(),
            request.field_mappings.as_ref().and_then(Option::as_ref),
            request.sync_preferences.as_ref().and_then(Option::as_ref),
        )?;

        let sealed = match request.credentials {
            Some(ref credentials) => {
                let integration_type = integration
                    .integration_type
                    .parse::<IntegrationType>()
                    .map_err(IntegrationError::Validation)?;
                let validation = validate_credentials(integration_type, credentials);
                if !validation.valid {
                    return Err(IntegrationError::Connection(validation.message));
                }
                Some(seal_credentials(self.cipher.as_ref(), credentials)?)
            }
            None => None,
        };

        let mut active_model: integrations::ActiveModel = integration.into();
        if let Some(name) = request.name {
            active_model.name = Set(name.trim().to_string());
        }
        if let Some(sealed) = sealed {
            active_model.credentials = Set(sealed);
        }
        if let Some(schedule) = request.sync_schedule {
            active_model.sync_schedule = Set(Some(schedule.trim().to_string()));
        }
        if let Some(mappings) = request.field_mappings {
            active_model.field_mappings = Set(mappings);
        }
        if let Some(preferences) = request.sync_preferences {
            active_model.sync_preferences = Set(preferences);
        }
        active_model.updated_at = Set(Utc::now().into());

        let updated = active_model.update(&self.db).await?;
        info!(integration_id = id, "Integration config updated");
        Ok(updated)
    }

    /// Delete an integration together with its sync history and health ledger
    pub async fn delete(&self, id: i32, owner: &str) -> Result<(), IntegrationError> {
        let txn = self.db.begin().await?;
        find_owned(&txn, id, owner).await?;

        let logs = SyncLogs::delete_many()
            .filter(sync_logs::Column::IntegrationId.eq(id))
            .exec(&txn)
            .await?;
        let events = IntegrationHealthEvents::delete_many()
            .filter(integration_health_events::Column::IntegrationId.eq(id))
            .exec(&txn)
            .await?;
        Integrations::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;

        info!(
            integration_id = id,
            sync_logs_deleted = logs.rows_affected,
            health_events_deleted = events.rows_affected,
            "Integration deleted"
        );
        Ok(())
    }

    /// Pause or resume an integration without touching its configuration
    pub async fn toggle_active(
        &self,
        id: i32,
        owner: &str,
    ) -> Result<integrations::Model, IntegrationError> {
        // Flipped in SQL so concurrent toggles never lose an update
        let flipped = Integrations::update_many()
            .col_expr(
                integrations::Column::IsActive,
                Expr::col(integrations::Column::IsActive).not(),
            )
            .col_expr(
                integrations::Column::UpdatedAt,
                Expr::value(DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(integrations::Column::Id.eq(id))
            .filter(integrations::Column::UserId.eq(owner))
            .exec(&self.db)
            .await?;
        if flipped.rows_affected == 0 {
            return Err(IntegrationError::NotFound);
        }

        let updated = find_owned(&self.db, id, owner).await?;
        info!(integration_id = id, is_active = updated.is_active, "Integration active flag toggled");
        Ok(updated)
    }
}

fn check_config_documents(
    schedule: Option<&str>,
    mappings: Option<&serde_json::Value>,
    preferences: Option<&serde_json::Value>,
) -> Result<(), IntegrationError> {
    if let Some(schedule) = schedule {
        validate_sync_schedule(schedule).map_err(IntegrationError::Validation)?;
    }
    if let Some(mappings) = mappings {
        validate_field_mappings(mappings).map_err(IntegrationError::Validation)?;
    }
    if let Some(preferences) = preferences {
        validate_sync_preferences(preferences).map_err(IntegrationError::Validation)?;
    }
    Ok(())
}
