// src/lib.rs

use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use services::{
    connection_health::ConnectionHealthMonitor,
    connector::BrokerConnector,
    credential_cipher::CredentialCipher,
    integration_registry::IntegrationRegistry,
    sync_history::SyncHistoryService,
    sync_orchestrator::{SyncOrchestrator, SyncPolicy},
};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub registry: IntegrationRegistry,
    pub health: ConnectionHealthMonitor,
    pub orchestrator: SyncOrchestrator,
    pub history: SyncHistoryService,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        cipher: Arc<dyn CredentialCipher>,
        connector: Arc<dyn BrokerConnector>,
        policy: SyncPolicy,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            registry: IntegrationRegistry::new(db.clone(), cipher.clone()),
            health: ConnectionHealthMonitor::new(
                db.clone(),
                cipher.clone(),
                connector.clone(),
                probe_timeout,
            ),
            orchestrator: SyncOrchestrator::new(db.clone(), cipher, connector, policy),
            history: SyncHistoryService::new(db.clone()),
            db,
        }
    }
}

pub mod entities {
    pub mod prelude;
    pub mod integrations;
    pub mod sync_logs;
    pub mod integration_health_events;
}

pub mod services {
    pub mod credential_cipher;
    pub mod config_validation;
    pub mod connector;
    pub mod health_ledger;
    pub mod integration_registry;
    pub mod connection_health;
    pub mod sync_orchestrator;
    pub mod sync_history;
}

pub mod config;
pub mod error;
pub mod models;
pub mod handlers;
pub mod jobs;
