//! Runtime configuration loaded from the environment (and `.env` via dotenvy)

use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::services::sync_orchestrator::SyncPolicy;

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_BIND_ADDRESS: &str = "BIND_ADDRESS";
pub const ENV_ENCRYPTION_KEY: &str = "CREDENTIALS_ENCRYPTION_KEY";
pub const ENV_SYNC_TIMEOUT: &str = "SYNC_TIMEOUT_SECS";
pub const ENV_FAILURE_THRESHOLD: &str = "SYNC_FAILURE_THRESHOLD";
pub const ENV_MAX_CONCURRENCY: &str = "SYNC_MAX_CONCURRENCY";
pub const ENV_RECONCILE_INTERVAL: &str = "SYNC_RECONCILE_INTERVAL_SECS";
pub const ENV_RECONCILE_GRACE: &str = "SYNC_RECONCILE_GRACE_SECS";
pub const ENV_PROBE_TIMEOUT: &str = "PROBE_TIMEOUT_SECS";

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 300;
const DEFAULT_FAILURE_THRESHOLD: f64 = 0.10;
const DEFAULT_MAX_CONCURRENCY: usize = 8;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;
const DEFAULT_RECONCILE_GRACE_SECS: u64 = 60;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: String,
    pub bind_address: String,
    /// base64-encoded 32-byte AES-256 key
    pub encryption_key: String,
    pub policy: SyncPolicy,
    pub reconcile_interval: Duration,
    pub reconcile_grace: Duration,
    pub probe_timeout: Duration,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var(ENV_DATABASE_URL).map_err(|_| ConfigError::Missing(ENV_DATABASE_URL))?;
        let encryption_key =
            env::var(ENV_ENCRYPTION_KEY).map_err(|_| ConfigError::Missing(ENV_ENCRYPTION_KEY))?;
        let bind_address =
            env::var(ENV_BIND_ADDRESS).unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());

        let timeout_secs = parse_env(ENV_SYNC_TIMEOUT, DEFAULT_SYNC_TIMEOUT_SECS, |v| *v > 0);
        let failure_threshold = parse_env(ENV_FAILURE_THRESHOLD, DEFAULT_FAILURE_THRESHOLD, |v| {
            (0.0..=1.0).contains(v)
        });
        let max_concurrency = parse_env(ENV_MAX_CONCURRENCY, DEFAULT_MAX_CONCURRENCY, |v| *v > 0);
        let reconcile_interval_secs =
            parse_env(ENV_RECONCILE_INTERVAL, DEFAULT_RECONCILE_INTERVAL_SECS, |v| *v > 0);
        let reconcile_grace_secs =
            parse_env(ENV_RECONCILE_GRACE, DEFAULT_RECONCILE_GRACE_SECS, |_| true);
        let probe_timeout_secs = parse_env(ENV_PROBE_TIMEOUT, DEFAULT_PROBE_TIMEOUT_SECS, |v| *v > 0);

        Ok(Self {
            database_url,
            bind_address,
            encryption_key,
            policy: SyncPolicy {
                failure_threshold,
                timeout: Duration::from_secs(timeout_secs),
                max_concurrency,
            },
            reconcile_interval: Duration::from_secs(reconcile_interval_secs),
            reconcile_grace: Duration::from_secs(reconcile_grace_secs),
            probe_timeout: Duration::from_secs(probe_timeout_secs),
        })
    }
}

/// Read an optional variable, falling back to `default` when unset or invalid.
fn parse_env<T>(name: &str, default: T, valid: impl Fn(&T) -> bool) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match env::var(name) {
        Err(_) => default,
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) if valid(&value) => value,
            _ => {
                warn!(variable = name, value = %raw, default = %default, "Invalid value, using default");
                default
            }
        },
    }
}
