use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Voucher {
    pub id: Uuid,
    pub code: String,
    pub discount_percent: i32,
    pub max_discount: Option<Decimal>,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    /// Restricts the voucher to a single event when set.
    pub event_id: Option<Uuid>,
    /// Personal vouchers (referral welcome, prize redemption) carry their owner.
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVoucher {
    pub code: String,
    pub discount_percent: i32,
    pub max_discount: Option<Decimal>,
    pub expires_at: DateTime<Utc>,
    pub event_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

/// Voucher codes are stored and matched upper-case.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
