#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use broker_sync_backend::{
    entities::integrations,
    models::integration::{CreateIntegrationRequest, IntegrationType},
    models::sync_log::SyncType,
    services::{
        connector::{BrokerConnector, ConnectionContext, ConnectorError, SyncOutcome},
        credential_cipher::{AesGcmCredentialCipher, CredentialCipher},
        sync_orchestrator::SyncPolicy,
    },
    AppState,
};
use chrono::{DateTime, FixedOffset};
use migration::{Migrator, MigratorTrait};
use parking_lot::Mutex;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde_json::json;
use tokio::sync::Notify;

pub const OWNER: &str = "user-1";
pub const OTHER_OWNER: &str = "user-2";

/// Set up an in-memory SQLite database with the schema applied.
/// A single pooled connection keeps the in-memory database alive.
pub async fn setup_test_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("Failed to connect to test DB");
    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    db
}

pub fn test_cipher() -> Arc<dyn CredentialCipher> {
    Arc::new(AesGcmCredentialCipher::new(&[7u8; 32]).unwrap())
}

pub fn test_policy() -> SyncPolicy {
    SyncPolicy {
        timeout: Duration::from_millis(200),
        ..SyncPolicy::default()
    }
}

pub async fn build_state(connector: Arc<ScriptedConnector>) -> AppState {
    build_state_with_policy(connector, test_policy()).await
}

pub async fn build_state_with_policy(
    connector: Arc<ScriptedConnector>,
    policy: SyncPolicy,
) -> AppState {
    let db = setup_test_db().await;
    AppState::new(
        db,
        test_cipher(),
        connector,
        policy,
        Duration::from_millis(200),
    )
}

pub fn skybox_request(name: &str) -> CreateIntegrationRequest {
    CreateIntegrationRequest {
        integration_type: IntegrationType::Skybox,
        name: name.to_string(),
        credentials: json!({ "apiToken": "sk-live-secret-token", "accountId": "acct-42" }),
        sync_schedule: None,
        field_mappings: None,
        sync_preferences: None,
    }
}

pub async fn create_integration(state: &AppState, owner: &str) -> integrations::Model {
    state
        .registry
        .create(owner, skybox_request("Main SkyBox account"))
        .await
        .unwrap()
}

pub fn outcome(processed: u32, succeeded: u32, failed: u32) -> SyncOutcome {
    SyncOutcome {
        records_processed: processed,
        records_succeeded: succeeded,
        records_failed: failed,
        errors: (0..failed.min(3))
            .map(|i| format!("Listing {} rejected", i + 1))
            .collect(),
    }
}

/// One scripted connector behaviour, consumed per sync call
pub enum Step {
    Outcome(SyncOutcome),
    Error(ConnectorError),
    Panic,
    /// Never completes within any test timeout
    Hang,
    /// Waits for the gate before reporting the outcome
    Gated(Arc<Notify>, SyncOutcome),
}

/// Connector replaying a queue of steps. An empty queue reports a clean
/// 10-record sync.
pub struct ScriptedConnector {
    steps: Mutex<VecDeque<Step>>,
    probe_result: Mutex<Result<String, ConnectorError>>,
    probe_delay: Mutex<Duration>,
    sync_calls: AtomicUsize,
    last_since: Mutex<Option<DateTime<FixedOffset>>>,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(VecDeque::new()),
            probe_result: Mutex::new(Ok("Connected".to_string())),
            probe_delay: Mutex::new(Duration::ZERO),
            sync_calls: AtomicUsize::new(0),
            last_since: Mutex::new(None),
        })
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().push_back(step);
    }

    pub fn set_probe(&self, result: Result<String, ConnectorError>) {
        *self.probe_result.lock() = result;
    }

    pub fn set_probe_delay(&self, delay: Duration) {
        *self.probe_delay.lock() = delay;
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    pub fn last_since(&self) -> Option<DateTime<FixedOffset>> {
        *self.last_since.lock()
    }
}

#[async_trait]
impl BrokerConnector for ScriptedConnector {
    async fn sync(
        &self,
        _context: &ConnectionContext,
        _sync_type: SyncType,
        since: Option<DateTime<FixedOffset>>,
    ) -> Result<SyncOutcome, ConnectorError> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_since.lock() = since;

        let step = self.steps.lock().pop_front();
        match step {
            None => Ok(outcome(10, 10, 0)),
            Some(Step::Outcome(outcome)) => Ok(outcome),
            Some(Step::Error(e)) => Err(e),
            Some(Step::Panic) => panic!("connector exploded"),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(SyncOutcome::default())
            }
            Some(Step::Gated(gate, outcome)) => {
                gate.notified().await;
                Ok(outcome)
            }
        }
    }

    async fn probe(&self, _context: &ConnectionContext) -> Result<String, ConnectorError> {
        let delay = *self.probe_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.probe_result.lock().clone()
    }
}
