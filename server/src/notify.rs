//! Best-effort user notifications and transactional email.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::store::LedgerStore;
use crate::utils::error::AppError;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: Uuid, message: &str) -> Result<(), AppError>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError>;
}

/// Persists notifications next to the ledger so users can list them later.
#[derive(Clone)]
pub struct StoreNotifier {
    store: Arc<dyn LedgerStore>,
}

impl StoreNotifier {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Notifier for StoreNotifier {
    async fn notify(&self, user_id: Uuid, message: &str) -> Result<(), AppError> {
        self.store.insert_notification(user_id, message).await
    }
}

/// Writes outgoing mail to the log instead of an SMTP relay.
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        tracing::info!(%to, %subject, %body, "Outgoing email");
        Ok(())
    }
}
