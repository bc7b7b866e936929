pub use super::integration_health_events::Entity as IntegrationHealthEvents;
pub use super::integrations::Entity as Integrations;
pub use super::sync_logs::Entity as SyncLogs;
