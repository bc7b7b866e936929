//! Connection Health Monitor
//!
//! Stateless credential validation and live connection probes. A failed probe
//! counts against the integration's error_count exactly like a failed sync; a
//! successful probe never resets it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use sea_orm::{
    prelude::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::entities::{integrations, prelude::Integrations};
use crate::error::IntegrationError;
use crate::models::health::{ConnectionTestResult, CredentialValidation, HealthEventKind};
use crate::models::integration::IntegrationType;
use crate::models::sync_log::SyncStatus;
use crate::services::config_validation;
use crate::services::connector::{BrokerConnector, ConnectionContext};
use crate::services::credential_cipher::CredentialCipher;
use crate::services::health_ledger;
use crate::services::integration_registry::find_owned;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ConnectionHealthMonitor {
    db: DatabaseConnection,
    cipher: Arc<dyn CredentialCipher>,
    connector: Arc<dyn BrokerConnector>,
    probe_timeout: Duration,
}

impl ConnectionHealthMonitor {
    pub fn new(
        db: DatabaseConnection,
        cipher: Arc<dyn CredentialCipher>,
        connector: Arc<dyn BrokerConnector>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            db,
            cipher,
            connector,
            probe_timeout,
        }
    }

    /// Shape check only. Nothing is persisted and no broker is contacted.
    pub fn validate_credentials(
        &self,
        integration_type: IntegrationType,
        credentials: &Value,
    ) -> CredentialValidation {
        config_validation::validate_credentials(integration_type, credentials)
    }

    /// Probe the broker with the stored credentials.
    ///
    /// Works on inactive integrations too. A failed probe is reported in the
    /// result, not as an error; only a missing integration or a storage fault
    /// is an `Err`.
    pub async fn test_connection(
        &self,
        id: i32,
        owner: &str,
    ) -> Result<ConnectionTestResult, IntegrationError> {
        let integration = find_owned(&self.db, id, owner).await?;

        let started = Instant::now();
        let probe = self.probe(&integration).await;
        let latency_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        let result = match probe {
            Ok(message) => {
                health_ledger::record_event(
                    &self.db,
                    id,
                    HealthEventKind::ProbeSucceeded,
                    None,
                    Some(message.clone()),
                )
                .await?;
                info!(integration_id = id, latency_ms = latency_ms, "Connection test succeeded");

                ConnectionTestResult {
                    success: true,
                    message,
                    latency_ms,
                    tested_at: Utc::now().to_rfc3339(),
                }
            }
            Err(message) => {
                self.record_probe_failure(id, &message).await?;
                warn!(integration_id = id, error = %message, "Connection test failed");

                ConnectionTestResult {
                    success: false,
                    message,
                    latency_ms,
                    tested_at: Utc::now().to_rfc3339(),
                }
            }
        };

        Ok(result)
    }

    async fn probe(&self, integration: &integrations::Model) -> Result<String, String> {
        let context = ConnectionContext::from_integration(self.cipher.as_ref(), integration)
            .map_err(|e| format!("Failed to prepare connector: {}", e))?;

        match tokio::time::timeout(self.probe_timeout, self.connector.probe(&context)).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "Connection test timed out after {}ms",
                self.probe_timeout.as_millis()
            )),
        }
    }

    /// Bump error_count and mark the last status FAILED. last_sync_at is left
    /// alone since no sync ran.
    async fn record_probe_failure(&self, id: i32, message: &str) -> Result<(), IntegrationError> {
        let txn = self.db.begin().await?;

        let updated = Integrations::update_many()
            .col_expr(
                integrations::Column::ErrorCount,
                Expr::col(integrations::Column::ErrorCount).add(1),
            )
            .col_expr(
                integrations::Column::LastSyncStatus,
                Expr::value(SyncStatus::Failed.as_str()),
            )
            .col_expr(
                integrations::Column::UpdatedAt,
                Expr::value(chrono::DateTime::<chrono::FixedOffset>::from(Utc::now())),
            )
            .filter(integrations::Column::Id.eq(id))
            .exec(&txn)
            .await?;

        // Deleted between lookup and probe
        if updated.rows_affected == 0 {
            return Err(IntegrationError::NotFound);
        }

        health_ledger::record_event(
            &txn,
            id,
            HealthEventKind::ProbeFailed,
            None,
            Some(message.to_string()),
        )
        .await?;

        txn.commit().await?;
        Ok(())
    }
}
