use std::sync::Arc;

use broker_sync_backend::{
    config::SyncConfig,
    handlers::integration_routes,
    jobs::sync_reconciliation::start_sync_reconciliation_job,
    services::{
        connector::SimulatedConnector, credential_cipher::AesGcmCredentialCipher,
    },
    AppState,
};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,broker_sync_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = SyncConfig::from_env()?;

    // Connect to database
    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url).await?;

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None).await?;

    let cipher = Arc::new(AesGcmCredentialCipher::from_base64_key(&config.encryption_key)?);
    let connector = Arc::new(SimulatedConnector::default());

    let state = AppState::new(
        db,
        cipher,
        connector,
        config.policy.clone(),
        config.probe_timeout,
    );

    start_sync_reconciliation_job(
        state.orchestrator.clone(),
        config.reconcile_interval,
        config.reconcile_grace,
    )
    .await;

    // Build router
    let app = integration_routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
