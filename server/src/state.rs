use std::sync::Arc;

use crate::gateway::PaymentGateway;
use crate::notify::{Mailer, Notifier, StoreNotifier};
use crate::services::{ReviewService, RewardsService, Sweeper, TransactionService};
use crate::store::LedgerStore;

#[derive(Clone)]
pub struct AppState {
    pub transactions: TransactionService,
    pub rewards: RewardsService,
    pub reviews: ReviewService,
}

impl AppState {
    /// Wires the services over one store. Notifications are persisted in the
    /// same store.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let notifier: Arc<dyn Notifier> = Arc::new(StoreNotifier::new(store.clone()));
        Self {
            transactions: TransactionService::new(
                store.clone(),
                gateway,
                notifier.clone(),
                mailer,
            ),
            rewards: RewardsService::new(store.clone(), notifier),
            reviews: ReviewService::new(store),
        }
    }

    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(self.transactions.clone(), self.rewards.clone())
    }
}
