//! Event reviews, open only to buyers whose purchase completed.

use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::review::{MAX_RATING, MIN_RATING};
use crate::models::{NewReview, Review};
use crate::store::LedgerStore;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReview {
    pub rating: i32,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn LedgerStore>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// One review per user and event, after a `COMPLETED` purchase.
    pub async fn create(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        request: CreateReview,
    ) -> Result<Review, AppError> {
        if !(MIN_RATING..=MAX_RATING).contains(&request.rating) {
            return Err(AppError::ValidationError(format!(
                "Rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }

        let mut uow = self.store.begin().await?;
        uow.lock_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {event_id} not found")))?;

        if !uow.has_completed_purchase(user_id, event_id).await? {
            return Err(AppError::AccessDenied(
                "Only buyers with a completed purchase can review this event".to_string(),
            ));
        }
        if uow.find_review(user_id, event_id).await?.is_some() {
            return Err(AppError::ValidationError(
                "You have already reviewed this event".to_string(),
            ));
        }

        let review = uow
            .insert_review(NewReview {
                user_id,
                event_id,
                rating: request.rating,
                comment: non_blank(request.comment),
                image_url: non_blank(request.image_url),
            })
            .await?;
        uow.commit().await?;

        info!(%user_id, %event_id, rating = review.rating, "Review created");
        Ok(review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank_trims_and_drops_empty() {
        assert_eq!(non_blank(Some("  great show ".into())).as_deref(), Some("great show"));
        assert_eq!(non_blank(Some("   ".into())), None);
        assert_eq!(non_blank(None), None);
    }
}
