use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{LedgerStore, UnitOfWork};
use crate::gateway::PaymentSession;
use crate::models::{
    Event, NewReview, NewTransaction, NewUser, NewVoucher, Notification, Prize, Review,
    Transaction, TransactionStatus, User, Voucher,
};
use crate::utils::error::AppError;

#[derive(Debug, Default, Clone)]
struct Tables {
    events: HashMap<Uuid, Event>,
    users: HashMap<Uuid, User>,
    vouchers: HashMap<Uuid, Voucher>,
    prizes: HashMap<Uuid, Prize>,
    transactions: HashMap<Uuid, Transaction>,
    notifications: Vec<Notification>,
    reviews: Vec<Review>,
}

/// In-process store. Units of work are fully serialized: `begin` takes the
/// table lock and works on a staged copy that replaces the tables on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_event(&self, event: Event) {
        self.tables.lock().await.events.insert(event.id, event);
    }

    pub async fn insert_user(&self, user: User) {
        self.tables.lock().await.users.insert(user.id, user);
    }

    pub async fn insert_voucher(&self, voucher: Voucher) {
        self.tables.lock().await.vouchers.insert(voucher.id, voucher);
    }

    pub async fn insert_prize(&self, prize: Prize) {
        self.tables.lock().await.prizes.insert(prize.id, prize);
    }

    /// Inserts or replaces a transaction row as-is.
    pub async fn insert_transaction(&self, transaction: Transaction) {
        self.tables
            .lock()
            .await
            .transactions
            .insert(transaction.id, transaction);
    }

    pub async fn voucher(&self, id: Uuid) -> Option<Voucher> {
        self.tables.lock().await.vouchers.get(&id).cloned()
    }

    pub async fn vouchers_for_user(&self, user_id: Uuid) -> Vec<Voucher> {
        self.tables
            .lock()
            .await
            .vouchers
            .values()
            .filter(|v| v.user_id == Some(user_id))
            .cloned()
            .collect()
    }

    pub async fn transactions_for_event(&self, event_id: Uuid) -> Vec<Transaction> {
        self.tables
            .lock()
            .await
            .transactions
            .values()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect()
    }

    pub async fn notifications_for(&self, user_id: Uuid) -> Vec<Notification> {
        self.tables
            .lock()
            .await
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn reviews_for_event(&self, event_id: Uuid) -> Vec<Review> {
        self.tables
            .lock()
            .await
            .reviews
            .iter()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect()
    }

    /// Overwrites `updated_at`, letting tests age a transaction.
    pub async fn backdate_transaction(&self, id: Uuid, updated_at: DateTime<Utc>) {
        if let Some(tx) = self.tables.lock().await.transactions.get_mut(&id) {
            tx.updated_at = updated_at;
        }
    }

    /// Overwrites `points_last_updated_at`, letting tests age a balance.
    pub async fn backdate_points(&self, id: Uuid, at: DateTime<Utc>) {
        if let Some(user) = self.tables.lock().await.users.get_mut(&id) {
            user.points_last_updated_at = at;
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, staged }))
    }

    async fn find_event(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        Ok(self.tables.lock().await.events.get(&id).cloned())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, AppError> {
        Ok(self.tables.lock().await.transactions.get(&id).cloned())
    }

    async fn set_payment_session(
        &self,
        id: Uuid,
        session: &PaymentSession,
    ) -> Result<Transaction, AppError> {
        let mut tables = self.tables.lock().await;
        let tx = tables
            .transactions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction {id} not found")))?;
        tx.payment_token = Some(session.token.clone());
        tx.payment_redirect_url = Some(session.redirect_url.clone());
        Ok(tx.clone())
    }

    async fn overdue_payments(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        Ok(self
            .tables
            .lock()
            .await
            .transactions
            .values()
            .filter(|t| t.status == TransactionStatus::PendingPayment && t.payment_deadline < now)
            .map(|t| t.id)
            .collect())
    }

    async fn stale_confirmations(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        Ok(self
            .tables
            .lock()
            .await
            .transactions
            .values()
            .filter(|t| t.status == TransactionStatus::PendingConfirmation && t.updated_at < cutoff)
            .map(|t| t.id)
            .collect())
    }

    async fn expire_idle_points(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut tables = self.tables.lock().await;
        let mut count = 0;
        for user in tables.users.values_mut() {
            if user.points > 0 && user.points_last_updated_at < cutoff {
                user.points = 0;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn insert_notification(&self, user_id: Uuid, message: &str) -> Result<(), AppError> {
        self.tables.lock().await.notifications.push(Notification {
            id: Uuid::new_v4(),
            user_id,
            message: message.to_string(),
            is_read: false,
            created_at: Utc::now(),
        });
        Ok(())
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

impl MemoryUnitOfWork {
    fn event_mut(&mut self, id: Uuid) -> Result<&mut Event, AppError> {
        self.staged
            .events
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Event {id} not found")))
    }

    fn user_mut(&mut self, id: Uuid) -> Result<&mut User, AppError> {
        self.staged
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_event(&mut self, id: Uuid) -> Result<Option<Event>, AppError> {
        Ok(self.staged.events.get(&id).cloned())
    }

    async fn adjust_ticket_sold(&mut self, event_id: Uuid, delta: i32) -> Result<Event, AppError> {
        let event = self.event_mut(event_id)?;
        let sold = event.ticket_sold + delta;
        if sold < 0 || sold > event.ticket_total {
            return Err(AppError::InternalServerError(format!(
                "ticket_sold for event {event_id} would become {sold}"
            )));
        }
        event.ticket_sold = sold;
        event.updated_at = Utc::now();
        Ok(event.clone())
    }

    async fn lock_user(&mut self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.staged.users.get(&id).cloned())
    }

    async fn lock_user_by_referral_code(&mut self, code: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .staged
            .users
            .values()
            .find(|u| u.referral_code == code)
            .cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .staged
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User, AppError> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            referral_code: user.referral_code,
            referred_by: user.referred_by,
            points: 0,
            points_last_updated_at: now,
            created_at: now,
            updated_at: now,
        };
        self.staged.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn adjust_points(
        &mut self,
        user_id: Uuid,
        delta: i64,
        touched_at: Option<DateTime<Utc>>,
    ) -> Result<User, AppError> {
        let user = self.user_mut(user_id)?;
        let points = user.points + delta;
        if points < 0 {
            return Err(AppError::InternalServerError(format!(
                "points for user {user_id} would become {points}"
            )));
        }
        user.points = points;
        if let Some(at) = touched_at {
            user.points_last_updated_at = at;
        }
        Ok(user.clone())
    }

    async fn lock_voucher_by_code(&mut self, code: &str) -> Result<Option<Voucher>, AppError> {
        Ok(self
            .staged
            .vouchers
            .values()
            .find(|v| v.code == code)
            .cloned())
    }

    async fn set_voucher_used(&mut self, voucher_id: Uuid, used: bool) -> Result<(), AppError> {
        let voucher = self
            .staged
            .vouchers
            .get_mut(&voucher_id)
            .ok_or_else(|| AppError::NotFound(format!("Voucher {voucher_id} not found")))?;
        voucher.is_used = used;
        Ok(())
    }

    async fn insert_voucher(&mut self, voucher: NewVoucher) -> Result<Voucher, AppError> {
        if self.staged.vouchers.values().any(|v| v.code == voucher.code) {
            return Err(AppError::ValidationError(format!(
                "Voucher code {} already exists",
                voucher.code
            )));
        }
        let voucher = Voucher {
            id: Uuid::new_v4(),
            code: voucher.code,
            discount_percent: voucher.discount_percent,
            max_discount: voucher.max_discount,
            expires_at: voucher.expires_at,
            is_used: false,
            event_id: voucher.event_id,
            user_id: voucher.user_id,
            created_at: Utc::now(),
        };
        self.staged.vouchers.insert(voucher.id, voucher.clone());
        Ok(voucher)
    }

    async fn find_prize(&mut self, id: Uuid) -> Result<Option<Prize>, AppError> {
        Ok(self.staged.prizes.get(&id).cloned())
    }

    async fn lock_transaction(&mut self, id: Uuid) -> Result<Option<Transaction>, AppError> {
        Ok(self.staged.transactions.get(&id).cloned())
    }

    async fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<Transaction, AppError> {
        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id: transaction.user_id,
            event_id: transaction.event_id,
            quantity: transaction.quantity,
            total_price: transaction.total_price,
            final_price: transaction.final_price,
            points_used: transaction.points_used,
            voucher_id: transaction.voucher_id,
            status: transaction.status,
            payment_deadline: transaction.payment_deadline,
            payment_proof_url: None,
            payment_token: None,
            payment_redirect_url: None,
            created_at: now,
            updated_at: now,
        };
        self.staged
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn update_transaction_status(
        &mut self,
        id: Uuid,
        status: TransactionStatus,
        proof_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Transaction, AppError> {
        let tx = self
            .staged
            .transactions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction {id} not found")))?;
        tx.status = status;
        if let Some(url) = proof_url {
            tx.payment_proof_url = Some(url.to_string());
        }
        tx.updated_at = now;
        Ok(tx.clone())
    }

    async fn has_completed_purchase(
        &mut self,
        user_id: Uuid,
        event_id: Uuid,
    ) -> Result<bool, AppError> {
        Ok(self.staged.transactions.values().any(|t| {
            t.user_id == user_id
                && t.event_id == event_id
                && t.status == TransactionStatus::Completed
        }))
    }

    async fn find_review(
        &mut self,
        user_id: Uuid,
        event_id: Uuid,
    ) -> Result<Option<Review>, AppError> {
        Ok(self
            .staged
            .reviews
            .iter()
            .find(|r| r.user_id == user_id && r.event_id == event_id)
            .cloned())
    }

    async fn insert_review(&mut self, review: NewReview) -> Result<Review, AppError> {
        if self.find_review(review.user_id, review.event_id).await?.is_some() {
            return Err(AppError::ValidationError(
                "You have already reviewed this event".to_string(),
            ));
        }
        let review = Review {
            id: Uuid::new_v4(),
            user_id: review.user_id,
            event_id: review.event_id,
            rating: review.rating,
            comment: review.comment,
            image_url: review.image_url,
            created_at: Utc::now(),
        };
        self.staged.reviews.push(review.clone());
        Ok(review)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryUnitOfWork { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
