//! Durable storage for events, users, vouchers and transactions.
//!
//! Every multi-row mutation goes through a [`UnitOfWork`]: rows read with the
//! `lock_*` methods stay locked until the unit of work is committed or dropped.
//! Dropping a unit of work without calling [`UnitOfWork::commit`] rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::gateway::PaymentSession;
use crate::models::{
    Event, NewReview, NewTransaction, NewUser, NewVoucher, Prize, Review, Transaction,
    TransactionStatus, User, Voucher,
};
use crate::utils::error::AppError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens a new atomic unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError>;

    async fn find_event(&self, id: Uuid) -> Result<Option<Event>, AppError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, AppError>;

    /// Stores the gateway token on a transaction outside of any unit of work.
    async fn set_payment_session(
        &self,
        id: Uuid,
        session: &PaymentSession,
    ) -> Result<Transaction, AppError>;

    /// Ids of `PENDING_PAYMENT` transactions whose deadline is before `now`.
    async fn overdue_payments(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError>;

    /// Ids of `PENDING_CONFIRMATION` transactions untouched since `cutoff`.
    async fn stale_confirmations(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, AppError>;

    /// Zeroes positive balances not updated since `cutoff`, returning the
    /// number of users affected.
    async fn expire_idle_points(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;

    async fn insert_notification(&self, user_id: Uuid, message: &str) -> Result<(), AppError>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    async fn lock_event(&mut self, id: Uuid) -> Result<Option<Event>, AppError>;

    /// Adds `delta` to `ticket_sold`. The store refuses results outside
    /// `0..=ticket_total`.
    async fn adjust_ticket_sold(&mut self, event_id: Uuid, delta: i32) -> Result<Event, AppError>;

    async fn lock_user(&mut self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn lock_user_by_referral_code(&mut self, code: &str) -> Result<Option<User>, AppError>;

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, AppError>;

    async fn insert_user(&mut self, user: NewUser) -> Result<User, AppError>;

    /// Adds `delta` to the user's points. Credits also refresh
    /// `points_last_updated_at` when `touched_at` is given.
    async fn adjust_points(
        &mut self,
        user_id: Uuid,
        delta: i64,
        touched_at: Option<DateTime<Utc>>,
    ) -> Result<User, AppError>;

    async fn lock_voucher_by_code(&mut self, code: &str) -> Result<Option<Voucher>, AppError>;

    async fn set_voucher_used(&mut self, voucher_id: Uuid, used: bool) -> Result<(), AppError>;

    async fn insert_voucher(&mut self, voucher: NewVoucher) -> Result<Voucher, AppError>;

    async fn find_prize(&mut self, id: Uuid) -> Result<Option<Prize>, AppError>;

    async fn lock_transaction(&mut self, id: Uuid) -> Result<Option<Transaction>, AppError>;

    async fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<Transaction, AppError>;

    /// Sets the status and bumps `updated_at`; a `proof_url` replaces the
    /// stored payment proof.
    async fn update_transaction_status(
        &mut self,
        id: Uuid,
        status: TransactionStatus,
        proof_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Transaction, AppError>;

    /// Whether `user_id` holds a `COMPLETED` transaction for `event_id`.
    async fn has_completed_purchase(
        &mut self,
        user_id: Uuid,
        event_id: Uuid,
    ) -> Result<bool, AppError>;

    async fn find_review(
        &mut self,
        user_id: Uuid,
        event_id: Uuid,
    ) -> Result<Option<Review>, AppError>;

    /// Fails with `ValidationError` if the user already reviewed the event.
    async fn insert_review(&mut self, review: NewReview) -> Result<Review, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}
