//! Sync Orchestrator
//!
//! Drives a sync attempt through PENDING → {SYNCED, FAILED}:
//! 1. Preconditions (ownership, active, no attempt in flight) are checked and
//!    the PENDING row is inserted in one transaction; the row is returned to
//!    the caller immediately.
//! 2. The connector runs on a spawned task, bounded by a semaphore and a
//!    timeout. Errors, panics and timeouts all become a FAILED resolution.
//! 3. The terminal write and the integration health update are committed
//!    together. The write is conditional on the row still being PENDING, so it
//!    happens at most once.
//!
//! PENDING rows whose task died with the process are resolved by
//! [`SyncOrchestrator::reconcile_stale_attempts`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, Utc};
use futures_util::FutureExt;
use sea_orm::{
    prelude::{DateTimeWithTimeZone, Expr},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::entities::{
    integrations,
    prelude::{Integrations, SyncLogs},
    sync_logs,
};
use crate::error::IntegrationError;
use crate::models::health::HealthEventKind;
use crate::models::sync_log::{SyncStatus, SyncType};
use crate::services::connector::{BrokerConnector, ConnectionContext, SyncOutcome};
use crate::services::credential_cipher::CredentialCipher;
use crate::services::health_ledger;
use crate::services::integration_registry::find_owned;

/// Default share of failed records above which an attempt is FAILED
pub const DEFAULT_FAILURE_THRESHOLD: f64 = 0.10;

/// Default bound on a single connector run
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of connector runs in flight process-wide
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Per-record messages kept on a failed attempt
const MAX_ERROR_MESSAGES: usize = 50;

#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// FAILED when `records_failed > failure_threshold * records_processed`
    pub failure_threshold: f64,
    pub timeout: Duration,
    pub max_concurrency: usize,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            timeout: DEFAULT_SYNC_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl SyncPolicy {
    /// Partial record failures are normal; only a failure share strictly above
    /// the threshold fails the attempt as a whole.
    pub fn classify(&self, records_processed: u32, records_failed: u32) -> SyncStatus {
        if f64::from(records_failed) > self.failure_threshold * f64::from(records_processed) {
            SyncStatus::Failed
        } else {
            SyncStatus::Synced
        }
    }
}

/// Final counters written on a terminal attempt.
/// `succeeded + failed == processed` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordCounts {
    pub processed: i32,
    pub succeeded: i32,
    pub failed: i32,
}

/// Terminal outcome computed for a PENDING attempt
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResolution {
    pub status: SyncStatus,
    pub processing_time_ms: i64,
    pub records: RecordCounts,
    pub error_messages: Vec<String>,
}

impl SyncResolution {
    /// Classify a connector outcome
    pub fn from_outcome(outcome: SyncOutcome, policy: &SyncPolicy, processing_time_ms: i64) -> Self {
        let succeeded = outcome.records_succeeded;
        let failed = outcome.records_failed;
        let processed = match succeeded.checked_add(failed) {
            Some(sum) if sum == outcome.records_processed => sum,
            Some(sum) => {
                warn!(
                    reported = outcome.records_processed,
                    succeeded = succeeded,
                    failed = failed,
                    "Connector counts inconsistent, using succeeded + failed"
                );
                sum
            }
            None => u32::MAX,
        };

        let status = policy.classify(processed, failed);
        let error_messages = if status == SyncStatus::Failed {
            let mut messages = vec![format!(
                "{} of {} records failed (threshold {:.0}%)",
                failed,
                processed,
                policy.failure_threshold * 100.0
            )];
            messages.extend(outcome.errors.into_iter().take(MAX_ERROR_MESSAGES));
            messages
        } else {
            Vec::new()
        };

        // Saturate into the column type without breaking the sum
        let succeeded = i32::try_from(succeeded).unwrap_or(i32::MAX);
        let failed = i32::try_from(failed)
            .unwrap_or(i32::MAX)
            .min(i32::MAX - succeeded);
        Self {
            status,
            processing_time_ms,
            records: RecordCounts {
                processed: succeeded + failed,
                succeeded,
                failed,
            },
            error_messages,
        }
    }

    /// FAILED resolution for an execution fault (connector error, panic,
    /// timeout, abandoned attempt). No records are counted.
    pub fn fault(message: impl Into<String>, processing_time_ms: i64) -> Self {
        Self {
            status: SyncStatus::Failed,
            processing_time_ms,
            records: RecordCounts::default(),
            error_messages: vec![message.into()],
        }
    }
}

/// A freshly created attempt and the task resolving it
pub struct SyncDispatch {
    pub attempt: sync_logs::Model,
    pub task: JoinHandle<()>,
}

#[derive(Clone)]
pub struct SyncOrchestrator {
    db: DatabaseConnection,
    cipher: Arc<dyn CredentialCipher>,
    connector: Arc<dyn BrokerConnector>,
    policy: SyncPolicy,
    permits: Arc<Semaphore>,
}

impl SyncOrchestrator {
    pub fn new(
        db: DatabaseConnection,
        cipher: Arc<dyn CredentialCipher>,
        connector: Arc<dyn BrokerConnector>,
        policy: SyncPolicy,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(policy.max_concurrency.max(1)));
        Self {
            db,
            cipher,
            connector,
            policy,
            permits,
        }
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Create a PENDING attempt and resolve it in the background.
    ///
    /// Returns as soon as the attempt row exists. Failures during execution
    /// are recorded on the attempt, never returned here.
    pub async fn trigger_sync(
        &self,
        id: i32,
        owner: &str,
        sync_type: SyncType,
    ) -> Result<sync_logs::Model, IntegrationError> {
        Ok(self.spawn_sync(id, owner, sync_type).await?.attempt)
    }

    /// Same as [`trigger_sync`](Self::trigger_sync), also handing back the
    /// background task
    pub async fn spawn_sync(
        &self,
        id: i32,
        owner: &str,
        sync_type: SyncType,
    ) -> Result<SyncDispatch, IntegrationError> {
        let (attempt, integration) = self.begin_attempt(id, owner, sync_type).await?;

        info!(
            integration_id = id,
            sync_log_id = attempt.id,
            sync_type = %sync_type,
            "Sync attempt created"
        );

        let task = self.dispatch(integration, attempt.clone(), sync_type);
        Ok(SyncDispatch { attempt, task })
    }

    async fn begin_attempt(
        &self,
        id: i32,
        owner: &str,
        sync_type: SyncType,
    ) -> Result<(sync_logs::Model, integrations::Model), IntegrationError> {
        let txn = self.db.begin().await?;

        let integration = find_owned(&txn, id, owner).await?;
        if !integration.is_active {
            return Err(IntegrationError::InactiveIntegration);
        }

        let in_flight = SyncLogs::find()
            .filter(sync_logs::Column::IntegrationId.eq(id))
            .filter(sync_logs::Column::Status.eq(SyncStatus::Pending.as_str()))
            .count(&txn)
            .await?;
        if in_flight > 0 {
            return Err(IntegrationError::SyncInProgress);
        }

        let attempt = insert_pending_attempt(&txn, id, sync_type).await?;

        txn.commit().await?;
        Ok((attempt, integration))
    }

    fn dispatch(
        &self,
        integration: integrations::Model,
        attempt: sync_logs::Model,
        sync_type: SyncType,
    ) -> JoinHandle<()> {
        let orchestrator = self.clone();

        // The timeout runs from started_at and covers the wait for a permit, so
        // a PENDING row older than timeout + grace has no live task behind it
        let queued_for = (Utc::now() - attempt.started_at.with_timezone(&Utc))
            .to_std()
            .unwrap_or_default();
        let deadline =
            tokio::time::Instant::now() + self.policy.timeout.saturating_sub(queued_for);

        tokio::spawn(async move {
            let queued = Instant::now();
            let acquire = orchestrator.permits.clone().acquire_owned();
            let _permit = match tokio::time::timeout_at(deadline, acquire).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(e)) => {
                    error!(sync_log_id = attempt.id, error = %e, "Sync worker pool closed");
                    return;
                }
                Err(_) => {
                    warn!(sync_log_id = attempt.id, "Sync timed out waiting for a worker");
                    let resolution = SyncResolution::fault(
                        format!(
                            "Sync timed out after {}ms waiting for a worker",
                            orchestrator.policy.timeout.as_millis()
                        ),
                        elapsed_ms(queued),
                    );
                    orchestrator.record(attempt.id, resolution).await;
                    return;
                }
            };

            // Resolved or deleted while queued for a permit
            match orchestrator.still_pending(attempt.id).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(sync_log_id = attempt.id, "Attempt no longer pending, skipping");
                    return;
                }
                Err(e) => {
                    warn!(sync_log_id = attempt.id, error = %e, "Failed to re-check attempt, running anyway");
                }
            }

            let resolution = orchestrator.execute(&integration, sync_type, deadline).await;
            orchestrator.record(attempt.id, resolution).await;
        })
    }

    async fn record(&self, attempt_id: i32, resolution: SyncResolution) {
        match self.finalize(attempt_id, resolution).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    sync_log_id = attempt_id,
                    "Attempt was already resolved or deleted, result discarded"
                );
            }
            Err(e) => {
                error!(
                    sync_log_id = attempt_id,
                    error = %e,
                    "Failed to record sync result, reconciliation will resolve it"
                );
            }
        }
    }

    async fn still_pending(&self, attempt_id: i32) -> Result<bool, DbErr> {
        let count = SyncLogs::find_by_id(attempt_id)
            .filter(sync_logs::Column::Status.eq(SyncStatus::Pending.as_str()))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    /// Run the connector and classify its result. Never fails: every fault
    /// becomes a FAILED resolution.
    async fn execute(
        &self,
        integration: &integrations::Model,
        sync_type: SyncType,
        deadline: tokio::time::Instant,
    ) -> SyncResolution {
        let started = Instant::now();
        let result = self.run_connector(integration, sync_type, deadline).await;

        match result {
            Ok(outcome) => SyncResolution::from_outcome(outcome, &self.policy, elapsed_ms(started)),
            Err(e) => {
                warn!(integration_id = integration.id, error = %e, "Sync execution fault");
                SyncResolution::fault(e.to_string(), elapsed_ms(started))
            }
        }
    }

    async fn run_connector(
        &self,
        integration: &integrations::Model,
        sync_type: SyncType,
        deadline: tokio::time::Instant,
    ) -> Result<SyncOutcome, IntegrationError> {
        let context = ConnectionContext::from_integration(self.cipher.as_ref(), integration)
            .map_err(|e| {
                IntegrationError::ConnectorExecution(format!("Failed to prepare connector: {}", e))
            })?;

        let since = match sync_type {
            SyncType::Full => None,
            SyncType::Incremental => last_successful_sync(&self.db, integration.id)
                .await
                .map_err(|e| IntegrationError::ConnectorExecution(e.to_string()))?,
        };

        let call = AssertUnwindSafe(self.connector.sync(&context, sync_type, since)).catch_unwind();

        match tokio::time::timeout_at(deadline, call).await {
            Err(_) => Err(IntegrationError::ConnectorExecution(format!(
                "Sync timed out after {}ms",
                self.policy.timeout.as_millis()
            ))),
            Ok(Err(panic)) => Err(IntegrationError::ConnectorExecution(format!(
                "Connector panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Ok(Ok(result)) => result.map_err(|e| IntegrationError::ConnectorExecution(e.to_string())),
        }
    }

    /// Apply a terminal resolution to a PENDING attempt and its integration's
    /// health in one transaction.
    ///
    /// Returns `Ok(false)` without writing anything when the attempt is gone
    /// or no longer PENDING.
    pub async fn finalize(
        &self,
        attempt_id: i32,
        resolution: SyncResolution,
    ) -> Result<bool, IntegrationError> {
        let txn = self.db.begin().await?;

        let Some(attempt) = SyncLogs::find_by_id(attempt_id).one(&txn).await? else {
            return Ok(false);
        };

        let status = resolution.status;
        let completed_at: DateTimeWithTimeZone = Utc::now().into();
        let error_messages = match status {
            SyncStatus::Failed => Some(json!(resolution.error_messages)),
            _ => None,
        };

        let transition = SyncLogs::update_many()
            .set(sync_logs::ActiveModel {
                status: Set(status.to_string()),
                completed_at: Set(Some(completed_at)),
                processing_time_ms: Set(Some(resolution.processing_time_ms)),
                records_processed: Set(Some(resolution.records.processed)),
                records_succeeded: Set(Some(resolution.records.succeeded)),
                records_failed: Set(Some(resolution.records.failed)),
                error_messages: Set(error_messages),
                ..Default::default()
            })
            .filter(sync_logs::Column::Id.eq(attempt_id))
            .filter(sync_logs::Column::Status.eq(SyncStatus::Pending.as_str()))
            .exec(&txn)
            .await?;

        if transition.rows_affected != 1 {
            return Ok(false);
        }

        let error_count = match status {
            SyncStatus::Failed => Expr::col(integrations::Column::ErrorCount).add(1),
            _ => Expr::value(0),
        };

        Integrations::update_many()
            .col_expr(integrations::Column::LastSyncAt, Expr::value(completed_at))
            .col_expr(integrations::Column::LastSyncStatus, Expr::value(status.as_str()))
            .col_expr(integrations::Column::ErrorCount, error_count)
            .col_expr(integrations::Column::UpdatedAt, Expr::value(completed_at))
            .filter(integrations::Column::Id.eq(attempt.integration_id))
            .exec(&txn)
            .await?;

        let (kind, message) = match status {
            SyncStatus::Failed => (
                HealthEventKind::SyncFailed,
                resolution.error_messages.first().cloned(),
            ),
            _ => (
                HealthEventKind::SyncSynced,
                Some(format!("{} records processed", resolution.records.processed)),
            ),
        };
        health_ledger::record_event(&txn, attempt.integration_id, kind, Some(attempt_id), message)
            .await?;

        txn.commit().await?;

        info!(
            integration_id = attempt.integration_id,
            sync_log_id = attempt_id,
            status = %status,
            records_processed = resolution.records.processed,
            records_failed = resolution.records.failed,
            processing_time_ms = resolution.processing_time_ms,
            "Sync attempt resolved"
        );
        Ok(true)
    }

    /// Resolve PENDING attempts older than `max_age` to FAILED.
    ///
    /// Covers attempts whose task was lost (process restart) or whose result
    /// could not be written. Returns how many attempts were resolved.
    pub async fn reconcile_stale_attempts(&self, max_age: Duration) -> Result<usize, IntegrationError> {
        let now = Utc::now();
        let age = chrono::Duration::from_std(max_age)
            .map_err(|e| IntegrationError::Validation(e.to_string()))?;
        let cutoff: DateTimeWithTimeZone = now
            .checked_sub_signed(age)
            .ok_or_else(|| IntegrationError::Validation("max_age out of range".to_string()))?
            .into();

        let stale = SyncLogs::find()
            .filter(sync_logs::Column::Status.eq(SyncStatus::Pending.as_str()))
            .filter(sync_logs::Column::StartedAt.lt(cutoff))
            .all(&self.db)
            .await?;

        let mut resolved = 0;
        for attempt in stale {
            let age_ms = (now - attempt.started_at.with_timezone(&Utc))
                .num_milliseconds()
                .max(0);
            let resolution = SyncResolution::fault(
                format!(
                    "Sync abandoned: no result recorded within {}ms, marked failed by reconciliation",
                    max_age.as_millis()
                ),
                age_ms,
            );

            if self.finalize(attempt.id, resolution).await? {
                warn!(
                    integration_id = attempt.integration_id,
                    sync_log_id = attempt.id,
                    "Stale sync attempt marked failed"
                );
                resolved += 1;
            }
        }

        Ok(resolved)
    }
}

/// completed_at of the newest SYNCED attempt, used as the incremental cursor
async fn last_successful_sync(
    db: &DatabaseConnection,
    integration_id: i32,
) -> Result<Option<DateTime<FixedOffset>>, DbErr> {
    let last = SyncLogs::find()
        .filter(sync_logs::Column::IntegrationId.eq(integration_id))
        .filter(sync_logs::Column::Status.eq(SyncStatus::Synced.as_str()))
        .order_by_desc(sync_logs::Column::CompletedAt)
        .one(db)
        .await?;
    Ok(last.and_then(|log| log.completed_at))
}

/// Insert the PENDING row. The partial unique index rejects it when a
/// concurrent trigger got its attempt in first.
async fn insert_pending_attempt<C: ConnectionTrait>(
    conn: &C,
    integration_id: i32,
    sync_type: SyncType,
) -> Result<sync_logs::Model, IntegrationError> {
    sync_logs::ActiveModel {
        integration_id: Set(integration_id),
        sync_type: Set(sync_type.to_string()),
        status: Set(SyncStatus::Pending.to_string()),
        started_at: Set(Utc::now().into()),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(map_insert_error)
}

fn map_insert_error(err: DbErr) -> IntegrationError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => IntegrationError::SyncInProgress,
        _ => IntegrationError::System(err),
    }
}

fn elapsed_ms(since: Instant) -> i64 {
    i64::try_from(since.elapsed().as_millis()).unwrap_or(i64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{ConnectOptions, Database};

    fn outcome(processed: u32, succeeded: u32, failed: u32) -> SyncOutcome {
        SyncOutcome {
            records_processed: processed,
            records_succeeded: succeeded,
            records_failed: failed,
            errors: vec![],
        }
    }

    #[test]
    fn test_classification_threshold() {
        let policy = SyncPolicy::default();
        // 4% failed
        assert_eq!(policy.classify(100, 4), SyncStatus::Synced);
        // 40% failed
        assert_eq!(policy.classify(50, 20), SyncStatus::Failed);
        // exactly 10% is not "more than" 10%
        assert_eq!(policy.classify(100, 10), SyncStatus::Synced);
        assert_eq!(policy.classify(100, 11), SyncStatus::Failed);
        assert_eq!(policy.classify(0, 0), SyncStatus::Synced);
    }

    #[test]
    fn test_configurable_threshold() {
        let policy = SyncPolicy {
            failure_threshold: 0.5,
            ..Default::default()
        };
        assert_eq!(policy.classify(50, 20), SyncStatus::Synced);
        assert_eq!(policy.classify(50, 26), SyncStatus::Failed);
    }

    #[test]
    fn test_synced_resolution_has_no_error_messages() {
        let mut reported = outcome(100, 96, 4);
        reported.errors = vec!["row 7 rejected".to_string()];

        let resolution = SyncResolution::from_outcome(reported, &SyncPolicy::default(), 12);
        assert_eq!(resolution.status, SyncStatus::Synced);
        assert!(resolution.error_messages.is_empty());
        assert_eq!(
            resolution.records,
            RecordCounts {
                processed: 100,
                succeeded: 96,
                failed: 4
            }
        );
    }

    #[test]
    fn test_failed_resolution_summarises_first() {
        let mut reported = outcome(50, 30, 20);
        reported.errors = vec!["row 1 rejected".to_string()];

        let resolution = SyncResolution::from_outcome(reported, &SyncPolicy::default(), 12);
        assert_eq!(resolution.status, SyncStatus::Failed);
        assert_eq!(resolution.error_messages[0], "20 of 50 records failed (threshold 10%)");
        assert_eq!(resolution.error_messages[1], "row 1 rejected");
    }

    #[test]
    fn test_inconsistent_counts_are_normalised() {
        let resolution =
            SyncResolution::from_outcome(outcome(10, 90, 5), &SyncPolicy::default(), 1);
        assert_eq!(resolution.records.processed, 95);
        assert_eq!(
            resolution.records.succeeded + resolution.records.failed,
            resolution.records.processed
        );
    }

    #[test]
    fn test_oversized_counts_still_add_up() {
        let resolution = SyncResolution::from_outcome(
            outcome(u32::MAX, 2_000_000_000, 2_000_000_000),
            &SyncPolicy::default(),
            1,
        );
        assert_eq!(resolution.records.succeeded, 2_000_000_000);
        assert_eq!(resolution.records.processed, i32::MAX);
        assert_eq!(
            resolution.records.succeeded + resolution.records.failed,
            resolution.records.processed
        );

        let resolution =
            SyncResolution::from_outcome(outcome(u32::MAX, u32::MAX - 5, 5), &SyncPolicy::default(), 1);
        assert_eq!(resolution.records.succeeded, i32::MAX);
        assert_eq!(resolution.records.failed, 0);
        assert_eq!(resolution.records.processed, i32::MAX);
    }

    async fn setup_db() -> DatabaseConnection {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(options).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_pending_index_turns_racing_insert_into_sync_in_progress() {
        let db = setup_db().await;
        let now: DateTimeWithTimeZone = Utc::now().into();
        let integration = integrations::ActiveModel {
            user_id: Set("user-1".to_string()),
            integration_type: Set("SKYBOX".to_string()),
            name: Set("SkyBox".to_string()),
            credentials: Set("sealed".to_string()),
            is_active: Set(true),
            error_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        // Both triggers passed the in-flight check; only the first insert lands
        let first = insert_pending_attempt(&db, integration.id, SyncType::Full).await;
        let second = insert_pending_attempt(&db, integration.id, SyncType::Incremental).await;

        assert_eq!(first.unwrap().status, "PENDING");
        assert!(matches!(second, Err(IntegrationError::SyncInProgress)));
        assert_eq!(SyncLogs::find().count(&db).await.unwrap(), 1);
    }

    #[test]
    fn test_fault_resolution() {
        let resolution = SyncResolution::fault("Broker unreachable", 5);
        assert_eq!(resolution.status, SyncStatus::Failed);
        assert_eq!(resolution.records, RecordCounts::default());
        assert_eq!(resolution.error_messages, vec!["Broker unreachable".to_string()]);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
