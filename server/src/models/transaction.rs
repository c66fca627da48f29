use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "transaction_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    PendingPayment,
    PendingConfirmation,
    Completed,
    Rejected,
    Cancelled,
    Expired,
}

/// Everything that can move a transaction out of its current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    UploadProof,
    /// Asks the gateway again for a payment token; the status does not change.
    RetryPayment,
    Approve,
    Reject,
    Cancel,
    ExpireByDeadline,
    ExpireByInactivity,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::PendingPayment => "PENDING_PAYMENT",
            TransactionStatus::PendingConfirmation => "PENDING_CONFIRMATION",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Rejected => "REJECTED",
            TransactionStatus::Cancelled => "CANCELLED",
            TransactionStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed
                | TransactionStatus::Rejected
                | TransactionStatus::Cancelled
                | TransactionStatus::Expired
        )
    }

    /// Statuses whose quantity is counted in `Event::ticket_sold`.
    pub fn holds_inventory(&self) -> bool {
        matches!(
            self,
            TransactionStatus::PendingPayment
                | TransactionStatus::PendingConfirmation
                | TransactionStatus::Completed
        )
    }

    /// Resolves the status reached by `transition`, or fails without side effects.
    pub fn apply(self, transition: Transition) -> Result<TransactionStatus, AppError> {
        use TransactionStatus::*;
        use Transition::*;

        let next = match (self, transition) {
            (PendingPayment, UploadProof) => PendingConfirmation,
            (PendingPayment, RetryPayment) => PendingPayment,
            (PendingPayment, ExpireByDeadline) => Expired,
            (PendingPayment, Cancel) => Cancelled,
            (PendingConfirmation, Approve) => Completed,
            (PendingConfirmation, Reject) => Rejected,
            (PendingConfirmation, ExpireByInactivity) => Cancelled,
            (from, transition) => {
                return Err(AppError::InvalidStateTransition { from, transition })
            }
        };
        Ok(next)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::UploadProof => "upload payment proof",
            Transition::RetryPayment => "retry payment for",
            Transition::Approve => "approve",
            Transition::Reject => "reject",
            Transition::Cancel => "cancel",
            Transition::ExpireByDeadline => "expire",
            Transition::ExpireByInactivity => "cancel for inactivity",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub quantity: i32,
    pub total_price: Decimal,
    pub final_price: Decimal,
    pub points_used: i64,
    pub voucher_id: Option<Uuid>,
    pub status: TransactionStatus,
    pub payment_deadline: DateTime<Utc>,
    pub payment_proof_url: Option<String>,
    pub payment_token: Option<String>,
    pub payment_redirect_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub quantity: i32,
    pub total_price: Decimal,
    pub final_price: Decimal,
    pub points_used: i64,
    pub voucher_id: Option<Uuid>,
    pub status: TransactionStatus,
    pub payment_deadline: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TransactionStatus; 6] = [
        TransactionStatus::PendingPayment,
        TransactionStatus::PendingConfirmation,
        TransactionStatus::Completed,
        TransactionStatus::Rejected,
        TransactionStatus::Cancelled,
        TransactionStatus::Expired,
    ];

    const TRANSITIONS: [Transition; 7] = [
        Transition::UploadProof,
        Transition::RetryPayment,
        Transition::Approve,
        Transition::Reject,
        Transition::Cancel,
        Transition::ExpireByDeadline,
        Transition::ExpireByInactivity,
    ];

    #[test]
    fn test_pending_payment_transitions() {
        let status = TransactionStatus::PendingPayment;
        assert_eq!(
            status.apply(Transition::UploadProof).unwrap(),
            TransactionStatus::PendingConfirmation
        );
        assert_eq!(
            status.apply(Transition::Cancel).unwrap(),
            TransactionStatus::Cancelled
        );
        assert_eq!(
            status.apply(Transition::ExpireByDeadline).unwrap(),
            TransactionStatus::Expired
        );
        assert_eq!(
            status.apply(Transition::RetryPayment).unwrap(),
            TransactionStatus::PendingPayment
        );
        assert!(status.apply(Transition::Approve).is_err());
        assert!(status.apply(Transition::Reject).is_err());
        assert!(status.apply(Transition::ExpireByInactivity).is_err());
    }

    #[test]
    fn test_pending_confirmation_transitions() {
        let status = TransactionStatus::PendingConfirmation;
        assert_eq!(
            status.apply(Transition::Approve).unwrap(),
            TransactionStatus::Completed
        );
        assert_eq!(
            status.apply(Transition::Reject).unwrap(),
            TransactionStatus::Rejected
        );
        assert_eq!(
            status.apply(Transition::ExpireByInactivity).unwrap(),
            TransactionStatus::Cancelled
        );
        assert!(status.apply(Transition::Cancel).is_err());
        assert!(status.apply(Transition::UploadProof).is_err());
        assert!(status.apply(Transition::RetryPayment).is_err());
    }

    #[test]
    fn test_retry_payment_message() {
        let err = TransactionStatus::Completed
            .apply(Transition::RetryPayment)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot retry payment for a transaction in status COMPLETED"
        );
    }

    #[test]
    fn test_terminal_statuses_reject_every_transition() {
        for status in ALL.iter().filter(|s| s.is_terminal()) {
            for transition in TRANSITIONS {
                let err = status.apply(transition).unwrap_err();
                assert_eq!(err.code(), "INVALID_STATE_TRANSITION");
            }
        }
    }

    #[test]
    fn test_status_strings_are_stable() {
        let json = serde_json::to_string(&TransactionStatus::PendingConfirmation).unwrap();
        assert_eq!(json, "\"PENDING_CONFIRMATION\"");
        for status in ALL {
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status.as_str())
            );
        }
    }
}
