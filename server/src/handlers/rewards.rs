use axum::extract::{Path, State};
use axum::response::Response;
use uuid::Uuid;

use crate::handlers::{ApiJson, CallerId};
use crate::services::rewards::{IssueVoucher, Registration};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::created;

pub async fn register_user(
    State(state): State<AppState>,
    ApiJson(registration): ApiJson<Registration>,
) -> Result<Response, AppError> {
    let registered = state.rewards.register(registration).await?;
    Ok(created(registered, "User registered"))
}

pub async fn issue_voucher(
    State(state): State<AppState>,
    CallerId(organizer_id): CallerId,
    ApiJson(request): ApiJson<IssueVoucher>,
) -> Result<Response, AppError> {
    let voucher = state.rewards.issue_voucher(organizer_id, request).await?;
    Ok(created(voucher, "Voucher issued"))
}

pub async fn redeem_prize(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(prize_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let voucher = state.rewards.redeem_prize(user_id, prize_id).await?;
    Ok(created(voucher, "Prize redeemed"))
}
