//! Application error types.
//!
//! Every fallible operation in the workspace returns [`AppResult`]. The
//! variants mirror how a failure should be reported: connectivity faults,
//! statements rejected by the database, and business-rule outcomes of the
//! shipment workflow.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::models::shipment::ShipmentStatus;
use crate::response::ApiResponse;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Unified application error.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The endpoint could not be reached or the connection dropped mid-call.
    #[error("database unavailable: {0}")]
    DatabaseConnection(String),

    /// The database rejected the statement (syntax, constraint, permission).
    #[error("statement failed: {0}")]
    DatabaseQuery(String),

    /// A reservation found less stock than requested.
    #[error("insufficient stock for item {item_id} (requested {requested})")]
    InsufficientStock { item_id: i64, requested: i64 },

    /// The shipment's status does not permit the requested operation.
    #[error("cannot {action} shipment {shipment_id} in status {status}")]
    InvalidTransition {
        shipment_id: i64,
        status: ShipmentStatus,
        action: &'static str,
    },

    #[error("shipment {0} not found")]
    ShipmentNotFound(i64),

    /// The courier is not a courier of the shipment's warehouse.
    #[error("employee {courier_id} is not a courier of warehouse {warehouse_id}")]
    CourierNotEligible { courier_id: i64, warehouse_id: i64 },

    #[error("validation error: {0}")]
    Validation(String),

    /// A script statement failed; earlier statements stay committed.
    #[error("script {path} failed at statement {index}: {source}")]
    Script {
        path: String,
        index: usize,
        source: Box<AppError>,
    },

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable error code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::DatabaseConnection(_) => "DATABASE_UNAVAILABLE",
            AppError::DatabaseQuery(_) => "STATEMENT_ERROR",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::ShipmentNotFound(_) => "NOT_FOUND",
            AppError::CourierNotEligible { .. } => "COURIER_NOT_ELIGIBLE",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Script { .. } => "SCRIPT_FAILED",
            AppError::Io(_) => "IO_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::DatabaseConnection(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseQuery(_) | AppError::Validation(_) | AppError::Io(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::InsufficientStock { .. } | AppError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            AppError::ShipmentNotFound(_) => StatusCode::NOT_FOUND,
            AppError::CourierNotEligible { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Script { source, .. } => source.status(),
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the failure is a connectivity fault rather than a rejected statement.
    pub fn is_connectivity(&self) -> bool {
        match self {
            AppError::DatabaseConnection(_) => true,
            AppError::Script { source, .. } => source.is_connectivity(),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => AppError::DatabaseConnection(err.to_string()),
            _ => AppError::DatabaseQuery(err.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}
