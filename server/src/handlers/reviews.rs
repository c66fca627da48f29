use axum::extract::{Path, State};
use axum::response::Response;
use uuid::Uuid;

use crate::handlers::{ApiJson, CallerId};
use crate::services::reviews::CreateReview;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::created;

pub async fn create_review(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(event_id): Path<Uuid>,
    ApiJson(request): ApiJson<CreateReview>,
) -> Result<Response, AppError> {
    let review = state.reviews.create(user_id, event_id, request).await?;
    Ok(created(review, "Review created"))
}
