use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::models::transaction::{TransactionStatus, Transition};
use crate::utils::response::error as error_response;

/// SQLSTATE codes that mean "retry the whole operation".
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Cannot {transition} a transaction in status {from}")]
    InvalidStateTransition {
        from: TransactionStatus,
        transition: Transition,
    },

    #[error("Insufficient inventory: requested {requested}, remaining {remaining}")]
    InsufficientInventory { requested: i32, remaining: i32 },

    #[error("Insufficient points: required {required}, available {available}")]
    InsufficientPoints { required: i64, available: i64 },

    #[error("Voucher code is invalid or expired")]
    VoucherInvalid,

    #[error("Voucher cannot be used for this event")]
    VoucherScopeMismatch,

    #[error("Voucher has already been used")]
    VoucherAlreadyUsed,

    #[error("Payment gateway error for transaction {transaction_id}: {message}")]
    PaymentGatewayError {
        transaction_id: Uuid,
        message: String,
    },

    #[error("Concurrent update conflict, retry the operation")]
    ConcurrencyConflict,

    #[error("Database error")]
    DatabaseError(#[source] sqlx::Error),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if matches!(
                db.code().as_deref(),
                Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | LOCK_NOT_AVAILABLE)
            ) {
                return AppError::ConcurrencyConflict;
            }
        }
        AppError::DatabaseError(err)
    }
}

impl AppError {
    pub fn insufficient_inventory(requested: i32, remaining: i32) -> Self {
        AppError::InsufficientInventory {
            requested,
            remaining,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AccessDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidStateTransition { .. }
            | AppError::InsufficientInventory { .. }
            | AppError::InsufficientPoints { .. }
            | AppError::ConcurrencyConflict => StatusCode::CONFLICT,
            AppError::VoucherInvalid
            | AppError::VoucherScopeMismatch
            | AppError::VoucherAlreadyUsed => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PaymentGatewayError { .. } => StatusCode::BAD_GATEWAY,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AccessDenied(_) => "ACCESS_DENIED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            AppError::InsufficientInventory { .. } => "INSUFFICIENT_INVENTORY",
            AppError::InsufficientPoints { .. } => "INSUFFICIENT_POINTS",
            AppError::VoucherInvalid => "VOUCHER_INVALID",
            AppError::VoucherScopeMismatch => "VOUCHER_SCOPE_MISMATCH",
            AppError::VoucherAlreadyUsed => "VOUCHER_ALREADY_USED",
            AppError::PaymentGatewayError { .. } => "PAYMENT_GATEWAY_ERROR",
            AppError::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
            AppError::InternalServerError(msg) => {
                error!(message = %msg, "Internal error");
            }
            AppError::PaymentGatewayError {
                transaction_id,
                message,
            } => {
                error!(%transaction_id, message = %message, "Payment gateway error");
            }
            _ => {
                warn!(code = self.code(), error = %self, "Request rejected");
            }
        }
    }
}

/// Formats a money amount without trailing zeros for user-facing messages.
pub(crate) fn display_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        // Only expose high-level message to the client
        let public_message = match &self {
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        let details = match &self {
            AppError::PaymentGatewayError { transaction_id, .. } => {
                Some(json!({ "transactionId": transaction_id }))
            }
            AppError::InsufficientInventory {
                requested,
                remaining,
            } => Some(json!({ "requested": requested, "remaining": remaining })),
            _ => None,
        };

        error_response(code, public_message, details, status)
    }
}
