use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::{LedgerStore, UnitOfWork};
use crate::gateway::PaymentSession;
use crate::models::{
    Event, NewReview, NewTransaction, NewUser, NewVoucher, Prize, Review, Transaction,
    TransactionStatus, User, Voucher,
};
use crate::utils::error::AppError;

const EVENT_COLUMNS: &str =
    "id, organizer_id, name, price, is_free, ticket_total, ticket_sold, created_at, updated_at";

const USER_COLUMNS: &str = "id, name, email, referral_code, referred_by, points, \
     points_last_updated_at, created_at, updated_at";

const VOUCHER_COLUMNS: &str = "id, code, discount_percent, max_discount, expires_at, is_used, \
     event_id, user_id, created_at";

const TRANSACTION_COLUMNS: &str = "id, user_id, event_id, quantity, total_price, final_price, \
     points_used, voucher_id, status, payment_deadline, payment_proof_url, payment_token, \
     payment_redirect_url, created_at, updated_at";

const REVIEW_COLUMNS: &str = "id, user_id, event_id, rating, comment, image_url, created_at";

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self {
            pool,
            lock_timeout_ms,
        }
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let mut tx = self.pool.begin().await?;

        // Lock waits beyond this surface as 55P03 and map to ConcurrencyConflict.
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout_ms))
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn find_event(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, AppError> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(transaction)
    }

    async fn set_payment_session(
        &self,
        id: Uuid,
        session: &PaymentSession,
    ) -> Result<Transaction, AppError> {
        sqlx::query_as::<_, Transaction>(&format!(
            "UPDATE transactions SET payment_token = $2, payment_redirect_url = $3 \
             WHERE id = $1 RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(id)
        .bind(&session.token)
        .bind(&session.redirect_url)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {id} not found")))
    }

    async fn overdue_payments(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM transactions WHERE status = $1 AND payment_deadline < $2",
        )
        .bind(TransactionStatus::PendingPayment)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn stale_confirmations(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM transactions WHERE status = $1 AND updated_at < $2",
        )
        .bind(TransactionStatus::PendingConfirmation)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn expire_idle_points(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE users SET points = 0, updated_at = NOW() \
             WHERE points > 0 AND points_last_updated_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_notification(&self, user_id: Uuid, message: &str) -> Result<(), AppError> {
        sqlx::query("INSERT INTO notifications (id, user_id, message) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PgUnitOfWork {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_event(&mut self, id: Uuid) -> Result<Option<Event>, AppError> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(event)
    }

    async fn adjust_ticket_sold(&mut self, event_id: Uuid, delta: i32) -> Result<Event, AppError> {
        // The guard in WHERE keeps the row untouched instead of tripping the CHECK constraint.
        sqlx::query_as::<_, Event>(&format!(
            "UPDATE events SET ticket_sold = ticket_sold + $2, updated_at = NOW() \
             WHERE id = $1 AND ticket_sold + $2 BETWEEN 0 AND ticket_total \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(event_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| {
            AppError::InternalServerError(format!(
                "ticket_sold adjustment {delta} rejected for event {event_id}"
            ))
        })
    }

    async fn lock_user(&mut self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn lock_user_by_referral_code(&mut self, code: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE referral_code = $1 FOR UPDATE"
        ))
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, name, email, referral_code, referred_by) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.referral_code)
        .bind(user.referred_by)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn adjust_points(
        &mut self,
        user_id: Uuid,
        delta: i64,
        touched_at: Option<DateTime<Utc>>,
    ) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET points = points + $2, \
             points_last_updated_at = COALESCE($3, points_last_updated_at), \
             updated_at = NOW() \
             WHERE id = $1 AND points + $2 >= 0 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(delta)
        .bind(touched_at)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| {
            AppError::InternalServerError(format!(
                "points adjustment {delta} rejected for user {user_id}"
            ))
        })
    }

    async fn lock_voucher_by_code(&mut self, code: &str) -> Result<Option<Voucher>, AppError> {
        let voucher = sqlx::query_as::<_, Voucher>(&format!(
            "SELECT {VOUCHER_COLUMNS} FROM vouchers WHERE code = $1 FOR UPDATE"
        ))
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(voucher)
    }

    async fn set_voucher_used(&mut self, voucher_id: Uuid, used: bool) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE vouchers SET is_used = $2 WHERE id = $1")
            .bind(voucher_id)
            .bind(used)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Voucher {voucher_id} not found")));
        }
        Ok(())
    }

    async fn insert_voucher(&mut self, voucher: NewVoucher) -> Result<Voucher, AppError> {
        let voucher = sqlx::query_as::<_, Voucher>(&format!(
            "INSERT INTO vouchers (id, code, discount_percent, max_discount, expires_at, event_id, user_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {VOUCHER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&voucher.code)
        .bind(voucher.discount_percent)
        .bind(voucher.max_discount)
        .bind(voucher.expires_at)
        .bind(voucher.event_id)
        .bind(voucher.user_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(voucher)
    }

    async fn find_prize(&mut self, id: Uuid) -> Result<Option<Prize>, AppError> {
        let prize = sqlx::query_as::<_, Prize>(
            "SELECT id, name, points_required, is_active FROM prizes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(prize)
    }

    async fn lock_transaction(&mut self, id: Uuid) -> Result<Option<Transaction>, AppError> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(transaction)
    }

    async fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<Transaction, AppError> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "INSERT INTO transactions (id, user_id, event_id, quantity, total_price, final_price, \
             points_used, voucher_id, status, payment_deadline, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) \
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(transaction.user_id)
        .bind(transaction.event_id)
        .bind(transaction.quantity)
        .bind(transaction.total_price)
        .bind(transaction.final_price)
        .bind(transaction.points_used)
        .bind(transaction.voucher_id)
        .bind(transaction.status)
        .bind(transaction.payment_deadline)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(transaction)
    }

    async fn update_transaction_status(
        &mut self,
        id: Uuid,
        status: TransactionStatus,
        proof_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Transaction, AppError> {
        sqlx::query_as::<_, Transaction>(&format!(
            "UPDATE transactions SET status = $2, \
             payment_proof_url = COALESCE($3, payment_proof_url), updated_at = $4 \
             WHERE id = $1 RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .bind(proof_url)
        .bind(now)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {id} not found")))
    }

    async fn has_completed_purchase(
        &mut self,
        user_id: Uuid,
        event_id: Uuid,
    ) -> Result<bool, AppError> {
        let found = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM transactions \
             WHERE user_id = $1 AND event_id = $2 AND status = $3)",
        )
        .bind(user_id)
        .bind(event_id)
        .bind(TransactionStatus::Completed)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(found)
    }

    async fn find_review(
        &mut self,
        user_id: Uuid,
        event_id: Uuid,
    ) -> Result<Option<Review>, AppError> {
        let review = sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE user_id = $1 AND event_id = $2"
        ))
        .bind(user_id)
        .bind(event_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(review)
    }

    async fn insert_review(&mut self, review: NewReview) -> Result<Review, AppError> {
        sqlx::query_as::<_, Review>(&format!(
            "INSERT INTO reviews (id, user_id, event_id, rating, comment, image_url) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(review.user_id)
        .bind(review.event_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(&review.image_url)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                AppError::ValidationError("You have already reviewed this event".to_string())
            }
            _ => AppError::from(e),
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}
