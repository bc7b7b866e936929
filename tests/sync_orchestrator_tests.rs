mod common;

use std::sync::Arc;
use std::time::Duration;

use broker_sync_backend::{
    entities::{
        integrations,
        prelude::{IntegrationHealthEvents, Integrations, SyncLogs},
        sync_logs,
    },
    error::IntegrationError,
    models::sync_log::SyncType,
    services::{
        connector::ConnectorError,
        sync_orchestrator::{SyncPolicy, SyncResolution},
    },
    AppState,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set, SqlErr};
use tokio::sync::Notify;

use crate::common::{
    build_state, build_state_with_policy, create_integration, outcome, ScriptedConnector, Step,
    OTHER_OWNER, OWNER,
};

async fn reload(state: &AppState, id: i32) -> integrations::Model {
    Integrations::find_by_id(id)
        .one(&state.db)
        .await
        .unwrap()
        .expect("integration exists")
}

async fn attempt(state: &AppState, id: i32) -> sync_logs::Model {
    SyncLogs::find_by_id(id)
        .one(&state.db)
        .await
        .unwrap()
        .expect("sync log exists")
}

/// Trigger a sync and wait for its background execution to finish
async fn run_sync(state: &AppState, id: i32, sync_type: SyncType) -> sync_logs::Model {
    let dispatch = state
        .orchestrator
        .spawn_sync(id, OWNER, sync_type)
        .await
        .unwrap();
    dispatch.task.await.unwrap();
    attempt(state, dispatch.attempt.id).await
}

#[tokio::test]
async fn test_trigger_returns_pending_attempt() {
    let connector = ScriptedConnector::new();
    let gate = Arc::new(Notify::new());
    connector.push(Step::Gated(gate.clone(), outcome(10, 10, 0)));
    let state = build_state(connector.clone()).await;
    let integration = create_integration(&state, OWNER).await;

    let dispatch = state
        .orchestrator
        .spawn_sync(integration.id, OWNER, SyncType::Full)
        .await
        .unwrap();

    assert_eq!(dispatch.attempt.status, "PENDING");
    assert_eq!(dispatch.attempt.sync_type, "FULL");
    assert!(dispatch.attempt.completed_at.is_none());
    assert!(dispatch.attempt.records_processed.is_none());

    gate.notify_one();
    dispatch.task.await.unwrap();

    let resolved = attempt(&state, dispatch.attempt.id).await;
    assert_eq!(resolved.status, "SYNCED");
    assert!(resolved.completed_at.is_some());
    assert!(resolved.processing_time_ms.unwrap() >= 0);
}

/// Create → SYNCED (4%) → FAILED (40%) → in-progress rejection → inactive rejection
#[tokio::test]
async fn test_sync_lifecycle_walkthrough() {
    let connector = ScriptedConnector::new();
    let state = build_state(connector.clone()).await;
    let integration = create_integration(&state, OWNER).await;
    assert!(integration.is_active);
    assert_eq!(integration.error_count, 0);

    // 4% failed records is within tolerance
    connector.push(Step::Outcome(outcome(100, 96, 4)));
    let first = run_sync(&state, integration.id, SyncType::Full).await;
    assert_eq!(first.status, "SYNCED");
    assert_eq!(first.records_processed, Some(100));
    assert_eq!(first.records_succeeded, Some(96));
    assert_eq!(first.records_failed, Some(4));
    assert!(first.error_messages.is_none());

    let after_first = reload(&state, integration.id).await;
    assert_eq!(after_first.error_count, 0);
    assert_eq!(after_first.last_sync_status.as_deref(), Some("SYNCED"));
    assert_eq!(after_first.last_sync_at, first.completed_at);

    // 40% failed records fails the attempt; hold it open to race a third trigger
    let gate = Arc::new(Notify::new());
    connector.push(Step::Gated(gate.clone(), outcome(50, 30, 20)));
    let second = state
        .orchestrator
        .spawn_sync(integration.id, OWNER, SyncType::Incremental)
        .await
        .unwrap();

    let third = state
        .orchestrator
        .trigger_sync(integration.id, OWNER, SyncType::Full)
        .await;
    assert!(matches!(third, Err(IntegrationError::SyncInProgress)));

    gate.notify_one();
    second.task.await.unwrap();

    let second = attempt(&state, second.attempt.id).await;
    assert_eq!(second.status, "FAILED");
    let after_second = reload(&state, integration.id).await;
    assert_eq!(after_second.error_count, 1);
    assert_eq!(after_second.last_sync_status.as_deref(), Some("FAILED"));

    // Only the two accepted attempts exist
    let count = SyncLogs::find().count(&state.db).await.unwrap();
    assert_eq!(count, 2);

    state
        .registry
        .toggle_active(integration.id, OWNER)
        .await
        .unwrap();
    let paused = state
        .orchestrator
        .trigger_sync(integration.id, OWNER, SyncType::Full)
        .await;
    assert!(matches!(paused, Err(IntegrationError::InactiveIntegration)));
    assert_eq!(SyncLogs::find().count(&state.db).await.unwrap(), 2);
}

#[tokio::test]
async fn test_error_count_accumulates_and_resets() {
    let connector = ScriptedConnector::new();
    let state = build_state(connector.clone()).await;
    let integration = create_integration(&state, OWNER).await;

    for expected in 1..=3 {
        connector.push(Step::Outcome(outcome(10, 5, 5)));
        let log = run_sync(&state, integration.id, SyncType::Full).await;
        assert_eq!(log.status, "FAILED");
        assert_eq!(reload(&state, integration.id).await.error_count, expected);
    }

    connector.push(Step::Outcome(outcome(10, 10, 0)));
    let log = run_sync(&state, integration.id, SyncType::Full).await;
    assert_eq!(log.status, "SYNCED");
    assert_eq!(reload(&state, integration.id).await.error_count, 0);
}

#[tokio::test]
async fn test_threshold_failure_records_summary_and_connector_errors() {
    let connector = ScriptedConnector::new();
    let state = build_state(connector.clone()).await;
    let integration = create_integration(&state, OWNER).await;

    connector.push(Step::Outcome(outcome(50, 30, 20)));
    let log = run_sync(&state, integration.id, SyncType::Full).await;

    let messages: Vec<String> = serde_json::from_value(log.error_messages.unwrap()).unwrap();
    assert_eq!(messages[0], "20 of 50 records failed (threshold 10%)");
    assert!(messages.contains(&"Listing 1 rejected".to_string()));
}

#[tokio::test]
async fn test_configured_threshold_is_honoured() {
    let connector = ScriptedConnector::new();
    let policy = SyncPolicy {
        failure_threshold: 0.5,
        timeout: Duration::from_millis(200),
        ..SyncPolicy::default()
    };
    let state = build_state_with_policy(connector.clone(), policy).await;
    let integration = create_integration(&state, OWNER).await;

    connector.push(Step::Outcome(outcome(50, 30, 20)));
    let log = run_sync(&state, integration.id, SyncType::Full).await;
    assert_eq!(log.status, "SYNCED");
}

#[tokio::test]
async fn test_connector_error_becomes_failed_attempt() {
    let connector = ScriptedConnector::new();
    let state = build_state(connector.clone()).await;
    let integration = create_integration(&state, OWNER).await;

    connector.push(Step::Error(ConnectorError::Unreachable(
        "connection refused".to_string(),
    )));
    let log = run_sync(&state, integration.id, SyncType::Full).await;

    assert_eq!(log.status, "FAILED");
    assert_eq!(log.records_processed, Some(0));
    let messages: Vec<String> = serde_json::from_value(log.error_messages.unwrap()).unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("connection refused"));
    assert_eq!(reload(&state, integration.id).await.error_count, 1);
}

#[tokio::test]
async fn test_connector_panic_becomes_failed_attempt() {
    let connector = ScriptedConnector::new();
    let state = build_state(connector.clone()).await;
    let integration = create_integration(&state, OWNER).await;

    connector.push(Step::Panic);
    let log = run_sync(&state, integration.id, SyncType::Full).await;

    assert_eq!(log.status, "FAILED");
    let messages: Vec<String> = serde_json::from_value(log.error_messages.unwrap()).unwrap();
    assert!(messages[0].contains("connector exploded"));

    // The integration is usable again afterwards
    let next = run_sync(&state, integration.id, SyncType::Full).await;
    assert_eq!(next.status, "SYNCED");
}

#[tokio::test]
async fn test_connector_timeout_becomes_failed_attempt() {
    let connector = ScriptedConnector::new();
    let state = build_state(connector.clone()).await;
    let integration = create_integration(&state, OWNER).await;

    connector.push(Step::Hang);
    let log = run_sync(&state, integration.id, SyncType::Full).await;

    assert_eq!(log.status, "FAILED");
    let messages: Vec<String> = serde_json::from_value(log.error_messages.unwrap()).unwrap();
    assert!(messages[0].contains("timed out"));
    assert_eq!(reload(&state, integration.id).await.error_count, 1);
}

#[tokio::test]
async fn test_incremental_sync_resumes_from_last_success() {
    let connector = ScriptedConnector::new();
    let state = build_state(connector.clone()).await;
    let integration = create_integration(&state, OWNER).await;

    run_sync(&state, integration.id, SyncType::Incremental).await;
    assert_eq!(connector.last_since(), None);

    let first = run_sync(&state, integration.id, SyncType::Full).await;
    assert_eq!(connector.last_since(), None);

    connector.push(Step::Outcome(outcome(10, 0, 10)));
    run_sync(&state, integration.id, SyncType::Incremental).await;
    assert!(connector.last_since().is_some());
    assert_eq!(connector.last_since(), first.completed_at);

    // A failed attempt does not move the cursor
    let before = connector.last_since();
    run_sync(&state, integration.id, SyncType::Incremental).await;
    assert_eq!(connector.last_since(), before);
}

#[tokio::test]
async fn test_trigger_checks_ownership() {
    let connector = ScriptedConnector::new();
    let state = build_state(connector.clone()).await;
    let integration = create_integration(&state, OWNER).await;

    let result = state
        .orchestrator
        .trigger_sync(integration.id, OTHER_OWNER, SyncType::Full)
        .await;
    assert!(matches!(result, Err(IntegrationError::NotFound)));

    let missing = state
        .orchestrator
        .trigger_sync(9999, OWNER, SyncType::Full)
        .await;
    assert!(matches!(missing, Err(IntegrationError::NotFound)));
    assert_eq!(connector.sync_calls(), 0);
}

#[tokio::test]
async fn test_store_rejects_second_pending_attempt() {
    let connector = ScriptedConnector::new();
    let state = build_state(connector).await;
    let integration = create_integration(&state, OWNER).await;

    let pending = || sync_logs::ActiveModel {
        integration_id: Set(integration.id),
        sync_type: Set("FULL".to_string()),
        status: Set("PENDING".to_string()),
        started_at: Set(Utc::now().into()),
        ..Default::default()
    };

    pending().insert(&state.db).await.unwrap();
    let err = pending().insert(&state.db).await.unwrap_err();
    assert!(matches!(
        err.sql_err(),
        Some(SqlErr::UniqueConstraintViolation(_))
    ));
}

#[tokio::test]
async fn test_terminal_write_happens_once() {
    let connector = ScriptedConnector::new();
    let state = build_state(connector.clone()).await;
    let integration = create_integration(&state, OWNER).await;

    let log = run_sync(&state, integration.id, SyncType::Full).await;
    assert_eq!(log.status, "SYNCED");

    let applied = state
        .orchestrator
        .finalize(log.id, SyncResolution::fault("late duplicate", 1))
        .await
        .unwrap();
    assert!(!applied);

    assert_eq!(attempt(&state, log.id).await, log);
    assert_eq!(reload(&state, integration.id).await.error_count, 0);
}

#[tokio::test]
async fn test_reconciliation_fails_stale_pending_attempts() {
    let connector = ScriptedConnector::new();
    let state = build_state(connector).await;
    let integration = create_integration(&state, OWNER).await;

    // Left behind by a process that died mid-sync
    let stale = sync_logs::ActiveModel {
        integration_id: Set(integration.id),
        sync_type: Set("FULL".to_string()),
        status: Set("PENDING".to_string()),
        started_at: Set((Utc::now() - chrono::Duration::minutes(30)).into()),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .unwrap();

    let resolved = state
        .orchestrator
        .reconcile_stale_attempts(Duration::from_secs(360))
        .await
        .unwrap();
    assert_eq!(resolved, 1);

    let stale = attempt(&state, stale.id).await;
    assert_eq!(stale.status, "FAILED");
    assert!(stale.completed_at.is_some());
    let messages: Vec<String> = serde_json::from_value(stale.error_messages.unwrap()).unwrap();
    assert!(messages[0].contains("abandoned"));
    assert!(messages[0].contains("within 360000ms"));

    let after = reload(&state, integration.id).await;
    assert_eq!(after.error_count, 1);
    assert_eq!(after.last_sync_status.as_deref(), Some("FAILED"));

    // Nothing left to do, and new syncs are accepted again
    let again = state
        .orchestrator
        .reconcile_stale_attempts(Duration::from_secs(360))
        .await
        .unwrap();
    assert_eq!(again, 0);
    let next = run_sync(&state, integration.id, SyncType::Full).await;
    assert_eq!(next.status, "SYNCED");
}

#[tokio::test]
async fn test_reconciliation_leaves_fresh_attempts_alone() {
    let connector = ScriptedConnector::new();
    let gate = Arc::new(Notify::new());
    connector.push(Step::Gated(gate.clone(), outcome(10, 10, 0)));
    let state = build_state(connector).await;
    let integration = create_integration(&state, OWNER).await;

    let dispatch = state
        .orchestrator
        .spawn_sync(integration.id, OWNER, SyncType::Full)
        .await
        .unwrap();

    let resolved = state
        .orchestrator
        .reconcile_stale_attempts(Duration::from_secs(360))
        .await
        .unwrap();
    assert_eq!(resolved, 0);

    gate.notify_one();
    dispatch.task.await.unwrap();
    assert_eq!(attempt(&state, dispatch.attempt.id).await.status, "SYNCED");
}

/// Waiting for a worker counts against the sync timeout, so every attempt is
/// resolved by its own task well before reconciliation would call it stale
#[tokio::test]
async fn test_queued_attempt_is_bounded_by_sync_timeout() {
    let connector = ScriptedConnector::new();
    let gate = Arc::new(Notify::new());
    connector.push(Step::Hang);
    connector.push(Step::Gated(gate.clone(), outcome(10, 10, 0)));
    let policy = SyncPolicy {
        timeout: Duration::from_millis(400),
        max_concurrency: 1,
        ..SyncPolicy::default()
    };
    let state = build_state_with_policy(connector.clone(), policy).await;
    let holder = create_integration(&state, OWNER).await;
    let queued = create_integration(&state, OWNER).await;

    let first = state
        .orchestrator
        .spawn_sync(holder.id, OWNER, SyncType::Full)
        .await
        .unwrap();
    let second = state
        .orchestrator
        .spawn_sync(queued.id, OWNER, SyncType::Full)
        .await
        .unwrap();

    // Without the queue wait counted this takes two full timeouts
    tokio::time::timeout(Duration::from_millis(700), async {
        first.task.await.unwrap();
        second.task.await.unwrap();
    })
    .await
    .expect("both attempts resolved within one sync timeout");

    for id in [first.attempt.id, second.attempt.id] {
        let log = attempt(&state, id).await;
        assert_eq!(log.status, "FAILED");
        let messages: Vec<String> = serde_json::from_value(log.error_messages.unwrap()).unwrap();
        assert!(messages[0].contains("timed out"));
    }
    assert!(connector.sync_calls() <= 2);

    // Nothing is left for reconciliation to take over
    let resolved = state
        .orchestrator
        .reconcile_stale_attempts(Duration::from_millis(400))
        .await
        .unwrap();
    assert_eq!(resolved, 0);
    assert_eq!(reload(&state, queued.id).await.error_count, 1);

    gate.notify_one();
    let next = run_sync(&state, queued.id, SyncType::Full).await;
    assert_eq!(next.status, "SYNCED");
}

#[tokio::test]
async fn test_resolution_appends_health_events() {
    let connector = ScriptedConnector::new();
    let state = build_state(connector.clone()).await;
    let integration = create_integration(&state, OWNER).await;

    run_sync(&state, integration.id, SyncType::Full).await;
    connector.push(Step::Outcome(outcome(10, 0, 10)));
    let failed = run_sync(&state, integration.id, SyncType::Full).await;

    let (events, total) = state
        .history
        .get_health_events(integration.id, OWNER, &Default::default())
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert_eq!(events[0].kind, "SYNC_FAILED");
    assert_eq!(events[0].sync_log_id, Some(failed.id));
    assert_eq!(events[1].kind, "SYNC_SYNCED");
    assert_eq!(IntegrationHealthEvents::find().count(&state.db).await.unwrap(), 2);
}

#[tokio::test]
async fn test_integration_deleted_mid_sync() {
    let connector = ScriptedConnector::new();
    let gate = Arc::new(Notify::new());
    connector.push(Step::Gated(gate.clone(), outcome(10, 10, 0)));
    let state = build_state(connector).await;
    let integration = create_integration(&state, OWNER).await;

    let dispatch = state
        .orchestrator
        .spawn_sync(integration.id, OWNER, SyncType::Full)
        .await
        .unwrap();

    state.registry.delete(integration.id, OWNER).await.unwrap();
    gate.notify_one();
    dispatch.task.await.unwrap();

    assert_eq!(SyncLogs::find().count(&state.db).await.unwrap(), 0);
    assert_eq!(Integrations::find().count(&state.db).await.unwrap(), 0);
}
