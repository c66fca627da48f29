//! Transaction settlement: creation and every status transition.
//!
//! Each operation that touches more than one row runs inside a single unit of
//! work. The transaction row is re-read under lock before any transition so
//! seats, points and vouchers are restored at most once. Notifications, email
//! and the payment gateway run only after the unit of work has committed.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::gateway::PaymentGateway;
use crate::models::transaction::Transition;
use crate::models::{Event, NewTransaction, Transaction, TransactionStatus};
use crate::notify::{Mailer, Notifier};
use crate::services::{inventory, loyalty};
use crate::store::{LedgerStore, UnitOfWork};
use crate::utils::error::{display_amount, AppError};

pub fn payment_window() -> Duration {
    Duration::hours(2)
}

pub fn confirmation_window() -> Duration {
    Duration::days(3)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransaction {
    pub event_id: Uuid,
    pub quantity: i32,
    #[serde(default)]
    pub voucher_code: Option<String>,
    #[serde(default)]
    pub use_points: bool,
}

#[derive(Clone)]
pub struct TransactionService {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    mailer: Arc<dyn Mailer>,
}

impl TransactionService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            mailer,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Reserves seats, applies voucher and points and records the purchase.
    ///
    /// Returns `PaymentGatewayError` when the purchase committed but no
    /// payment token could be obtained; the transaction remains readable and
    /// [`TransactionService::retry_payment`] can be called for it.
    pub async fn create(
        &self,
        user_id: Uuid,
        request: CreateTransaction,
    ) -> Result<Transaction, AppError> {
        if request.quantity <= 0 {
            return Err(AppError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let now = Utc::now();
        let mut uow = self.store.begin().await?;

        let event = uow
            .lock_event(request.event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", request.event_id)))?;
        let user = uow
            .lock_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))?;

        inventory::ensure_capacity(&event, request.quantity)?;

        let total_price = event.price * Decimal::from(request.quantity);
        let mut final_price = total_price;

        let voucher = match request.voucher_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                let applied = loyalty::apply_voucher(
                    uow.as_mut(),
                    code,
                    event.id,
                    user.id,
                    total_price,
                    now,
                )
                .await?;
                final_price = applied.final_price;
                Some(applied)
            }
            _ => None,
        };

        let mut points_used = 0;
        if request.use_points {
            let redemption = loyalty::apply_points(uow.as_mut(), &user, final_price).await?;
            points_used = redemption.points_used;
            final_price = redemption.final_price;
        }

        let status = if event.is_free {
            TransactionStatus::Completed
        } else {
            TransactionStatus::PendingPayment
        };

        let transaction = uow
            .insert_transaction(
                NewTransaction {
                    user_id: user.id,
                    event_id: event.id,
                    quantity: request.quantity,
                    total_price,
                    final_price,
                    points_used,
                    voucher_id: voucher.as_ref().map(|v| v.voucher_id),
                    status,
                    payment_deadline: now + payment_window(),
                },
                now,
            )
            .await?;

        if let Some(voucher) = &voucher {
            loyalty::lock_voucher(uow.as_mut(), voucher.voucher_id).await?;
        }

        inventory::reserve(uow.as_mut(), &event, request.quantity).await?;
        uow.commit().await?;

        info!(
            transaction_id = %transaction.id,
            event_id = %event.id,
            %user_id,
            quantity = transaction.quantity,
            total_price = %transaction.total_price,
            final_price = %transaction.final_price,
            points_used,
            status = %transaction.status,
            "Transaction created"
        );

        if event.is_free {
            self.announce(
                user_id,
                &format!(
                    "You got tickets for the free event \"{}\"! Your e-ticket is ready.",
                    event.name
                ),
            )
            .await;
        }

        if transaction.status == TransactionStatus::PendingPayment
            && transaction.final_price > Decimal::ZERO
        {
            return self.open_payment_session(transaction).await;
        }

        Ok(transaction)
    }

    /// Obtains a payment token for a transaction still awaiting payment.
    /// An already stored token is returned as-is.
    pub async fn retry_payment(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Transaction, AppError> {
        let transaction = self.load(transaction_id).await?;
        ensure_buyer(&transaction, user_id)?;

        transaction.status.apply(Transition::RetryPayment)?;
        if transaction.payment_token.is_some() || transaction.final_price <= Decimal::ZERO {
            return Ok(transaction);
        }

        self.open_payment_session(transaction).await
    }

    /// Visible to the buyer and to the organizer of the event.
    pub async fn get(&self, caller_id: Uuid, transaction_id: Uuid) -> Result<Transaction, AppError> {
        let transaction = self.load(transaction_id).await?;
        if transaction.user_id == caller_id {
            return Ok(transaction);
        }

        let event = self.store.find_event(transaction.event_id).await?;
        match event {
            Some(event) if event.organizer_id == caller_id => Ok(transaction),
            _ => Err(AppError::AccessDenied(
                "You do not have access to this transaction".to_string(),
            )),
        }
    }

    pub async fn upload_proof(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
        proof_url: &str,
    ) -> Result<Transaction, AppError> {
        if proof_url.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Payment proof reference is required".to_string(),
            ));
        }

        let now = Utc::now();
        let mut uow = self.store.begin().await?;
        let transaction = lock_transaction(uow.as_mut(), transaction_id).await?;
        ensure_buyer(&transaction, user_id)?;

        let next = transaction.status.apply(Transition::UploadProof)?;
        let updated = uow
            .update_transaction_status(transaction.id, next, Some(proof_url.trim()), now)
            .await?;
        uow.commit().await?;

        info!(%transaction_id, %user_id, "Payment proof uploaded");
        Ok(updated)
    }

    pub async fn approve(
        &self,
        organizer_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Transaction, AppError> {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;
        let transaction = lock_transaction(uow.as_mut(), transaction_id).await?;
        let event = lock_organized_event(uow.as_mut(), &transaction, organizer_id).await?;

        let next = transaction.status.apply(Transition::Approve)?;
        let updated = uow
            .update_transaction_status(transaction.id, next, None, now)
            .await?;
        uow.commit().await?;

        info!(%transaction_id, %organizer_id, "Transaction approved");

        self.announce(
            updated.user_id,
            &format!(
                "Payment for \"{}\" has been confirmed! Your e-ticket is now available.",
                event.name
            ),
        )
        .await;
        self.email_buyer(
            updated.user_id,
            "Payment confirmed",
            &format!(
                "Your payment for \"{}\" has been confirmed.",
                event.name
            ),
        )
        .await;

        Ok(updated)
    }

    pub async fn reject(
        &self,
        organizer_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Transaction, AppError> {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;
        let transaction = lock_transaction(uow.as_mut(), transaction_id).await?;
        let event = lock_organized_event(uow.as_mut(), &transaction, organizer_id).await?;

        let updated = settle(uow.as_mut(), &transaction, Transition::Reject, now).await?;
        uow.commit().await?;

        info!(
            %transaction_id,
            %organizer_id,
            points_restored = transaction.points_used,
            voucher_restored = transaction.voucher_id.is_some(),
            "Transaction rejected"
        );

        self.announce(
            updated.user_id,
            &format!(
                "Payment for \"{}\" was rejected. Your points and voucher have been returned.",
                event.name
            ),
        )
        .await;
        self.email_buyer(
            updated.user_id,
            "Payment rejected",
            &format!(
                "Sorry, your payment of {} for \"{}\" was rejected. Any points or voucher used have been returned.",
                display_amount(updated.final_price),
                event.name
            ),
        )
        .await;

        Ok(updated)
    }

    pub async fn cancel(&self, user_id: Uuid, transaction_id: Uuid) -> Result<Transaction, AppError> {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;
        let transaction = lock_transaction(uow.as_mut(), transaction_id).await?;
        ensure_buyer(&transaction, user_id)?;

        let updated = settle(uow.as_mut(), &transaction, Transition::Cancel, now).await?;
        uow.commit().await?;

        info!(%transaction_id, %user_id, "Transaction cancelled by customer");
        Ok(updated)
    }

    /// Expires one unpaid transaction whose deadline has passed. Returns
    /// `None` if the row is no longer eligible when locked.
    pub async fn expire_by_deadline(
        &self,
        transaction_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>, AppError> {
        let mut uow = self.store.begin().await?;
        let transaction = lock_transaction(uow.as_mut(), transaction_id).await?;

        if transaction.status != TransactionStatus::PendingPayment
            || transaction.payment_deadline >= now
        {
            return Ok(None);
        }

        let updated = settle(uow.as_mut(), &transaction, Transition::ExpireByDeadline, now).await?;
        uow.commit().await?;

        info!(%transaction_id, quantity = updated.quantity, "Unpaid transaction expired");
        self.announce(
            updated.user_id,
            "Your transaction expired because no payment was received before the deadline.",
        )
        .await;

        Ok(Some(updated))
    }

    /// Cancels one transaction whose proof has waited too long for the
    /// organizer. Returns `None` if the row is no longer eligible when locked.
    pub async fn expire_by_inactivity(
        &self,
        transaction_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>, AppError> {
        let mut uow = self.store.begin().await?;
        let transaction = lock_transaction(uow.as_mut(), transaction_id).await?;

        if transaction.status != TransactionStatus::PendingConfirmation
            || transaction.updated_at >= now - confirmation_window()
        {
            return Ok(None);
        }

        let updated =
            settle(uow.as_mut(), &transaction, Transition::ExpireByInactivity, now).await?;
        uow.commit().await?;

        info!(%transaction_id, "Unconfirmed transaction cancelled for inactivity");

        let event_name = match self.store.find_event(updated.event_id).await {
            Ok(Some(event)) => event.name,
            _ => "your event".to_string(),
        };
        self.announce(
            updated.user_id,
            &format!(
                "Your transaction for \"{event_name}\" was cancelled automatically because the organizer did not confirm it. Your points and voucher have been returned."
            ),
        )
        .await;

        Ok(Some(updated))
    }

    async fn load(&self, transaction_id: Uuid) -> Result<Transaction, AppError> {
        self.store
            .find_transaction(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {transaction_id} not found")))
    }

    async fn open_payment_session(&self, transaction: Transaction) -> Result<Transaction, AppError> {
        let session = self
            .gateway
            .create_payment_session(transaction.id, transaction.final_price)
            .await
            .map_err(|e| {
                warn!(transaction_id = %transaction.id, error = %e, "Payment session failed");
                AppError::PaymentGatewayError {
                    transaction_id: transaction.id,
                    message: "Failed to initialize payment gateway".to_string(),
                }
            })?;

        self.store.set_payment_session(transaction.id, &session).await
    }

    async fn announce(&self, user_id: Uuid, message: &str) {
        if let Err(e) = self.notifier.notify(user_id, message).await {
            warn!(%user_id, error = %e, "Notification failed");
        }
    }

    async fn email_buyer(&self, user_id: Uuid, subject: &str, body: &str) {
        let user = match self.store.find_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                warn!(%user_id, error = %e, "Could not load email recipient");
                return;
            }
        };
        if let Err(e) = self.mailer.send(&user.email, subject, body).await {
            warn!(%user_id, error = %e, "Email delivery failed");
        }
    }
}

fn ensure_buyer(transaction: &Transaction, user_id: Uuid) -> Result<(), AppError> {
    if transaction.user_id != user_id {
        return Err(AppError::AccessDenied(
            "This transaction belongs to another user".to_string(),
        ));
    }
    Ok(())
}

async fn lock_transaction(
    uow: &mut dyn UnitOfWork,
    transaction_id: Uuid,
) -> Result<Transaction, AppError> {
    uow.lock_transaction(transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {transaction_id} not found")))
}

async fn lock_organized_event(
    uow: &mut dyn UnitOfWork,
    transaction: &Transaction,
    organizer_id: Uuid,
) -> Result<Event, AppError> {
    let event = uow
        .lock_event(transaction.event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {} not found", transaction.event_id)))?;

    if event.organizer_id != organizer_id {
        return Err(AppError::AccessDenied(
            "Only the event organizer can review this transaction".to_string(),
        ));
    }
    Ok(event)
}

/// Ends a transaction without completing it: seats go back to the event,
/// points and voucher go back to the buyer.
async fn settle(
    uow: &mut dyn UnitOfWork,
    transaction: &Transaction,
    transition: Transition,
    now: DateTime<Utc>,
) -> Result<Transaction, AppError> {
    let next = transaction.status.apply(transition)?;

    inventory::release(&mut *uow, transaction.event_id, transaction.quantity).await?;
    loyalty::restore(&mut *uow, transaction, now).await?;

    uow.update_transaction_status(transaction.id, next, None, now)
        .await
}
