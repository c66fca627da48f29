use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Prize {
    pub id: Uuid,
    pub name: String,
    pub points_required: i64,
    pub is_active: bool,
}
