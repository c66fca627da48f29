#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use eventhub_server::gateway::{GatewayError, MockPaymentGateway, PaymentGateway, PaymentSession};
use eventhub_server::models::{Event, Prize, User, Voucher};
use eventhub_server::notify::{LogMailer, Notifier, StoreNotifier};
use eventhub_server::services::{ReviewService, RewardsService, Sweeper, TransactionService};
use eventhub_server::store::{LedgerStore, MemoryStore};
use eventhub_server::utils::error::AppError;

/// Mock gateway that can be switched into a failing mode.
#[derive(Clone, Default)]
pub struct FlakyGateway {
    pub failing: Arc<AtomicBool>,
    pub calls: Arc<AtomicUsize>,
    inner: MockPaymentGateway,
}

impl FlakyGateway {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FlakyGateway {
    async fn create_payment_session(
        &self,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<PaymentSession, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("connection reset".into()));
        }
        self.inner.create_payment_session(order_id, amount).await
    }
}

pub struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn notify(&self, _user_id: Uuid, _message: &str) -> Result<(), AppError> {
        Err(AppError::InternalServerError("notification relay down".into()))
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub gateway: FlakyGateway,
    pub transactions: TransactionService,
    pub rewards: RewardsService,
    pub reviews: ReviewService,
}

impl Harness {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let shared: Arc<dyn LedgerStore> = Arc::new(store.clone());
        let notifier: Arc<dyn Notifier> = Arc::new(StoreNotifier::new(shared.clone()));
        Self::with_notifier(store, notifier)
    }

    pub fn with_notifier(store: MemoryStore, notifier: Arc<dyn Notifier>) -> Self {
        let shared: Arc<dyn LedgerStore> = Arc::new(store.clone());
        let gateway = FlakyGateway::default();
        let transactions = TransactionService::new(
            shared.clone(),
            Arc::new(gateway.clone()),
            notifier.clone(),
            Arc::new(LogMailer),
        );
        let rewards = RewardsService::new(shared.clone(), notifier);
        let reviews = ReviewService::new(shared);
        Self {
            store,
            gateway,
            transactions,
            rewards,
            reviews,
        }
    }

    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(self.transactions.clone(), self.rewards.clone())
    }

    pub async fn event(&self, price: i64, total: i32, sold: i32) -> Event {
        let event = event(Uuid::new_v4(), price, total, sold);
        self.store.insert_event(event.clone()).await;
        event
    }

    pub async fn user(&self, points: i64) -> User {
        let user = user(points);
        self.store.insert_user(user.clone()).await;
        user
    }

    pub async fn voucher(&self, code: &str, percent: i32, max_discount: Option<i64>) -> Voucher {
        let voucher = voucher(code, percent, max_discount);
        self.store.insert_voucher(voucher.clone()).await;
        voucher
    }

    pub async fn prize(&self, points_required: i64) -> Prize {
        let prize = Prize {
            id: Uuid::new_v4(),
            name: "Backstage pass".to_string(),
            points_required,
            is_active: true,
        };
        self.store.insert_prize(prize.clone()).await;
        prize
    }

    pub async fn ticket_sold(&self, event_id: Uuid) -> i32 {
        self.store
            .find_event(event_id)
            .await
            .unwrap()
            .expect("event exists")
            .ticket_sold
    }

    pub async fn points(&self, user_id: Uuid) -> i64 {
        self.store
            .find_user(user_id)
            .await
            .unwrap()
            .expect("user exists")
            .points
    }
}

pub fn event(organizer_id: Uuid, price: i64, total: i32, sold: i32) -> Event {
    let now = Utc::now();
    Event {
        id: Uuid::new_v4(),
        organizer_id,
        name: "Jazz Night".to_string(),
        price: Decimal::from(price),
        is_free: price == 0,
        ticket_total: total,
        ticket_sold: sold,
        created_at: now,
        updated_at: now,
    }
}

pub fn user(points: i64) -> User {
    let id = Uuid::new_v4();
    let now = Utc::now();
    User {
        id,
        name: "Rina".to_string(),
        email: format!("{}@example.test", id.simple()),
        referral_code: format!("REF-{}", &id.simple().to_string()[..8].to_uppercase()),
        referred_by: None,
        points,
        points_last_updated_at: now,
        created_at: now,
        updated_at: now,
    }
}

pub fn voucher(code: &str, percent: i32, max_discount: Option<i64>) -> Voucher {
    Voucher {
        id: Uuid::new_v4(),
        code: code.to_string(),
        discount_percent: percent,
        max_discount: max_discount.map(Decimal::from),
        expires_at: Utc::now() + Duration::days(30),
        is_used: false,
        event_id: None,
        user_id: None,
        created_at: Utc::now(),
    }
}
