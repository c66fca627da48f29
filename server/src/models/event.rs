use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub is_free: bool,
    pub ticket_total: i32,
    pub ticket_sold: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Seats still available for reservation.
    pub fn remaining(&self) -> i32 {
        self.ticket_total - self.ticket_sold
    }
}
