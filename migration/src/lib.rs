pub use sea_orm_migration::prelude::*;

mod m20261019_000001_create_integrations;
mod m20261019_000002_create_sync_logs;
mod m20261019_000003_create_integration_health_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261019_000001_create_integrations::Migration),
            Box::new(m20261019_000002_create_sync_logs::Migration),
            Box::new(m20261019_000003_create_integration_health_events::Migration),
        ]
    }
}
