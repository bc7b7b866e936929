//! Sync Reconciliation Job
//!
//! Periodically resolves sync attempts stuck in PENDING to FAILED. An attempt
//! is stuck when it is older than the sync timeout plus a grace period. The
//! timeout already covers queueing for a worker, so this only happens if the
//! task was lost (process restart) or its result could not be written.
//! Supports graceful shutdown via SIGTERM/SIGINT signals.

use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use crate::services::sync_orchestrator::SyncOrchestrator;

/// Start the sync reconciliation job
///
/// * `every` - time between passes; the first pass runs immediately so
///   attempts orphaned by a restart are resolved at startup
/// * `grace` - added to the sync timeout before an attempt counts as stale
pub async fn start_sync_reconciliation_job(
    orchestrator: SyncOrchestrator,
    every: Duration,
    grace: Duration,
) {
    tokio::spawn(async move {
        let max_age = orchestrator.policy().timeout + grace;

        info!(
            interval_secs = every.as_secs(),
            max_age_secs = max_age.as_secs(),
            "Sync reconciliation job started"
        );

        let mut interval = interval(every);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping sync reconciliation job");
                    break;
                }
                _ = interval.tick() => {
                    match orchestrator.reconcile_stale_attempts(max_age).await {
                        Ok(0) => {}
                        Ok(resolved) => {
                            info!(resolved = resolved, "Stale sync attempts resolved");
                        }
                        Err(e) => {
                            // Next tick retries
                            error!(error = %e, "Sync reconciliation failed");
                        }
                    }
                }
            }
        }

        info!("Sync reconciliation job stopped");
    });
}
