//! Error taxonomy for the integration subsystem

use axum::{http::StatusCode, Json};
use sea_orm::DbErr;
use thiserror::Error;

use crate::models::error::ErrorResponse;
use crate::services::credential_cipher::CipherError;

#[derive(Debug, Error)]
pub enum IntegrationError {
    /// Integration absent, or owned by someone other than the caller
    #[error("Integration not found")]
    NotFound,

    #[error("Integration is inactive")]
    InactiveIntegration,

    #[error("A sync is already in progress for this integration")]
    SyncInProgress,

    /// Credential validation or live probe failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// The connector faulted mid-sync. Only ever recorded on the sync log,
    /// never returned from a trigger call.
    #[error("Connector execution error: {0}")]
    ConnectorExecution(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Credential cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("System error: {0}")]
    System(#[from] DbErr),
}

impl IntegrationError {
    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            IntegrationError::NotFound => "NOT_FOUND",
            IntegrationError::InactiveIntegration => "INTEGRATION_INACTIVE",
            IntegrationError::SyncInProgress => "SYNC_IN_PROGRESS",
            IntegrationError::Connection(_) => "CONNECTION_ERROR",
            IntegrationError::ConnectorExecution(_) => "CONNECTOR_EXECUTION_ERROR",
            IntegrationError::Validation(_) => "VALIDATION_ERROR",
            IntegrationError::Cipher(_) | IntegrationError::System(_) => "SYSTEM_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            IntegrationError::NotFound => StatusCode::NOT_FOUND,
            IntegrationError::InactiveIntegration | IntegrationError::SyncInProgress => {
                StatusCode::CONFLICT
            }
            IntegrationError::Connection(_) | IntegrationError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            IntegrationError::ConnectorExecution(_)
            | IntegrationError::Cipher(_)
            | IntegrationError::System(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert a service error into the handler error tuple, logging server faults.
pub fn error_response(err: IntegrationError) -> (StatusCode, Json<ErrorResponse>) {
    let status = err.status_code();
    if status.is_server_error() {
        tracing::error!(error = %err, "Integration request failed");
    } else {
        tracing::debug!(error = %err, "Integration request rejected");
    }

    // Do not leak database or cipher internals to clients
    let message = match &err {
        IntegrationError::Cipher(_) | IntegrationError::System(_) => {
            "Internal server error".to_string()
        }
        other => other.to_string(),
    };

    (
        status,
        Json(ErrorResponse {
            error: message,
            code: err.code().to_string(),
        }),
    )
}
