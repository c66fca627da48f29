use axum::extract::{Path, State};
use axum::response::Response;
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::{ApiJson, CallerId};
use crate::services::transactions::CreateTransaction;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequest {
    pub proof_url: String,
}

pub async fn create_transaction(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    ApiJson(request): ApiJson<CreateTransaction>,
) -> Result<Response, AppError> {
    let transaction = state.transactions.create(user_id, request).await?;
    Ok(created(transaction, "Transaction created"))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    CallerId(caller_id): CallerId,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let transaction = state.transactions.get(caller_id, id).await?;
    Ok(success(transaction, "Transaction retrieved"))
}

pub async fn upload_payment_proof(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<ProofRequest>,
) -> Result<Response, AppError> {
    let transaction = state
        .transactions
        .upload_proof(user_id, id, &request.proof_url)
        .await?;
    Ok(success(transaction, "Payment proof uploaded"))
}

pub async fn retry_payment(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let transaction = state.transactions.retry_payment(user_id, id).await?;
    Ok(success(transaction, "Payment session ready"))
}

pub async fn approve_transaction(
    State(state): State<AppState>,
    CallerId(organizer_id): CallerId,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let transaction = state.transactions.approve(organizer_id, id).await?;
    Ok(success(transaction, "Transaction approved"))
}

pub async fn reject_transaction(
    State(state): State<AppState>,
    CallerId(organizer_id): CallerId,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let transaction = state.transactions.reject(organizer_id, id).await?;
    Ok(success(transaction, "Transaction rejected"))
}

pub async fn cancel_transaction(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let transaction = state.transactions.cancel(user_id, id).await?;
    Ok(success(transaction, "Transaction cancelled"))
}
