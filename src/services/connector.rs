//! Broker connector seam
//!
//! The connector is the component that actually talks to a third-party broker.
//! Its wire formats are out of scope here; the sync engine only sees record
//! counts and failures.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use rand::Rng;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::entities::integrations;
use crate::error::IntegrationError;
use crate::models::integration::IntegrationType;
use crate::models::sync_log::SyncType;
use crate::services::credential_cipher::{open_credentials, CredentialCipher};

/// Everything a connector needs to reach one integration's broker
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub integration_id: i32,
    pub integration_type: IntegrationType,
    /// Decrypted credentials. Never persisted from here.
    pub credentials: Value,
    pub field_mappings: Option<Value>,
}

impl ConnectionContext {
    /// Decrypt an integration's stored credentials for one connector call
    pub fn from_integration(
        cipher: &dyn CredentialCipher,
        integration: &integrations::Model,
    ) -> Result<Self, IntegrationError> {
        let integration_type = integration
            .integration_type
            .parse::<IntegrationType>()
            .map_err(IntegrationError::Validation)?;
        let credentials = open_credentials(cipher, &integration.credentials)?;

        Ok(Self {
            integration_id: integration.id,
            integration_type,
            credentials,
            field_mappings: integration.field_mappings.clone(),
        })
    }
}

/// Counts reported by one connector run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub records_processed: u32,
    pub records_succeeded: u32,
    pub records_failed: u32,
    /// Per-record failure reasons, if the connector reports them
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    #[error("Broker unreachable: {0}")]
    Unreachable(String),
    #[error("Broker rejected credentials: {0}")]
    Unauthorized(String),
    #[error("Failed to decode broker response: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Pull/push records for the integration. Partial record failures are
    /// reported in the outcome, not as an error.
    async fn sync(
        &self,
        context: &ConnectionContext,
        sync_type: SyncType,
        since: Option<DateTime<FixedOffset>>,
    ) -> Result<SyncOutcome, ConnectorError>;

    /// Reachability check without data transfer. Returns a human-readable status.
    async fn probe(&self, context: &ConnectionContext) -> Result<String, ConnectorError>;
}

/// Stand-in connector used until real broker connectors are wired in.
///
/// Waits `latency`, then reports a random batch where each record fails with
/// probability `record_failure_rate`.
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    latency: Duration,
    record_failure_rate: f64,
}

impl SimulatedConnector {
    pub fn new(latency: Duration, record_failure_rate: f64) -> Self {
        Self {
            latency,
            record_failure_rate: record_failure_rate.clamp(0.0, 1.0),
        }
    }

    fn simulate_batch(&self, sync_type: SyncType) -> SyncOutcome {
        let mut rng = rand::thread_rng();
        let processed: u32 = match sync_type {
            SyncType::Full => rng.gen_range(100..=500),
            SyncType::Incremental => rng.gen_range(0..=100),
        };
        let failed = (0..processed)
            .filter(|_| rng.gen_bool(self.record_failure_rate))
            .count() as u32;

        SyncOutcome {
            records_processed: processed,
            records_succeeded: processed - failed,
            records_failed: failed,
            errors: (0..failed.min(5))
                .map(|i| format!("Record {} rejected by broker", i + 1))
                .collect(),
        }
    }
}

impl Default for SimulatedConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), 0.02)
    }
}

#[async_trait]
impl BrokerConnector for SimulatedConnector {
    async fn sync(
        &self,
        context: &ConnectionContext,
        sync_type: SyncType,
        since: Option<DateTime<FixedOffset>>,
    ) -> Result<SyncOutcome, ConnectorError> {
        if !context.credentials.is_object() {
            return Err(ConnectorError::Unauthorized(
                "credentials are not an object".to_string(),
            ));
        }

        debug!(
            integration_id = context.integration_id,
            integration_type = %context.integration_type,
            sync_type = %sync_type,
            since = ?since,
            "Simulating broker sync"
        );

        // ThreadRng is !Send, so draw the batch before awaiting
        let outcome = self.simulate_batch(sync_type);
        tokio::time::sleep(self.latency).await;
        Ok(outcome)
    }

    async fn probe(&self, context: &ConnectionContext) -> Result<String, ConnectorError> {
        if !context.credentials.is_object() {
            return Err(ConnectorError::Unauthorized(
                "credentials are not an object".to_string(),
            ));
        }
        tokio::time::sleep(self.latency / 10).await;
        Ok(format!("Connected to {}", context.integration_type))
    }
}
