//! Everything that feeds the loyalty ledger outside of a purchase: referral
//! bonuses at registration, prize redemption, organizer vouchers and the
//! points expiry sweep.

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::voucher::normalize_code;
use crate::models::{NewUser, NewVoucher, User, Voucher};
use crate::notify::Notifier;
use crate::services::loyalty;
use crate::store::LedgerStore;
use crate::utils::error::AppError;

pub const REFERRAL_BONUS_POINTS: i64 = 10_000;
pub const WELCOME_VOUCHER_PERCENT: i32 = 10;
pub const VOUCHER_VALIDITY_MONTHS: u32 = 3;
pub const POINTS_EXPIRY_MONTHS: u32 = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registered {
    pub user: User,
    pub welcome_voucher: Option<Voucher>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueVoucher {
    pub event_id: Uuid,
    pub code: String,
    pub discount_percent: i32,
    #[serde(default)]
    pub max_discount: Option<Decimal>,
    pub expires_at: DateTime<Utc>,
}

/// Voucher percentage granted for a prize of the given cost.
pub fn prize_discount_percent(points_required: i64) -> i32 {
    match points_required {
        p if p >= 5_000 => 50,
        p if p >= 2_000 => 25,
        p if p >= 1_000 => 15,
        _ => 10,
    }
}

fn random_suffix(len: usize) -> String {
    Uuid::new_v4().simple().to_string()[..len].to_uppercase()
}

fn months_after(at: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    at.checked_add_months(Months::new(months)).unwrap_or(at)
}

#[derive(Clone)]
pub struct RewardsService {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
}

impl RewardsService {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Creates an account. A known referral code credits the referrer and
    /// issues a welcome voucher to the new user; unknown codes are ignored.
    pub async fn register(&self, registration: Registration) -> Result<Registered, AppError> {
        let name = registration.name.trim();
        let email = registration.email.trim().to_lowercase();
        if name.is_empty() || !email.contains('@') {
            return Err(AppError::ValidationError(
                "A name and a valid email are required".to_string(),
            ));
        }

        let now = Utc::now();
        let mut uow = self.store.begin().await?;

        if uow.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::ValidationError(
                "Email is already registered".to_string(),
            ));
        }

        let referrer = match registration.referral_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                let referrer = uow.lock_user_by_referral_code(&code.to_uppercase()).await?;
                if referrer.is_none() {
                    debug!(referral_code = %code, "Unknown referral code ignored");
                }
                referrer
            }
            _ => None,
        };

        let user = uow
            .insert_user(NewUser {
                name: name.to_string(),
                email,
                referral_code: format!("REF-{}", random_suffix(8)),
                referred_by: referrer.as_ref().map(|r| r.id),
            })
            .await?;

        let welcome_voucher = match &referrer {
            Some(referrer) => {
                loyalty::credit_points(uow.as_mut(), referrer.id, REFERRAL_BONUS_POINTS, now)
                    .await?;
                let voucher = uow
                    .insert_voucher(NewVoucher {
                        code: format!("WELCOME-{}", random_suffix(6)),
                        discount_percent: WELCOME_VOUCHER_PERCENT,
                        max_discount: None,
                        expires_at: months_after(now, VOUCHER_VALIDITY_MONTHS),
                        event_id: None,
                        user_id: Some(user.id),
                    })
                    .await?;
                Some(voucher)
            }
            None => None,
        };

        uow.commit().await?;
        info!(user_id = %user.id, referred = referrer.is_some(), "User registered");

        if let Some(referrer) = referrer {
            if let Err(e) = self
                .notifier
                .notify(
                    referrer.id,
                    &format!(
                        "Congratulations! You earned {REFERRAL_BONUS_POINTS} points because a friend signed up with your referral code."
                    ),
                )
                .await
            {
                warn!(user_id = %referrer.id, error = %e, "Notification failed");
            }
        }

        Ok(Registered {
            user,
            welcome_voucher,
        })
    }

    /// Spends points on an active prize in exchange for a personal voucher.
    pub async fn redeem_prize(&self, user_id: Uuid, prize_id: Uuid) -> Result<Voucher, AppError> {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;

        let prize = uow
            .find_prize(prize_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| AppError::NotFound(format!("Prize {prize_id} not found or inactive")))?;
        let user = uow
            .lock_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))?;

        loyalty::spend_points(uow.as_mut(), &user, prize.points_required).await?;
        let voucher = uow
            .insert_voucher(NewVoucher {
                code: format!("PRIZE-{}", random_suffix(6)),
                discount_percent: prize_discount_percent(prize.points_required),
                max_discount: None,
                expires_at: months_after(now, VOUCHER_VALIDITY_MONTHS),
                event_id: None,
                user_id: Some(user.id),
            })
            .await?;
        uow.commit().await?;

        info!(%user_id, %prize_id, points = prize.points_required, "Prize redeemed");
        Ok(voucher)
    }

    /// Issues an event-scoped voucher on behalf of the event's organizer.
    pub async fn issue_voucher(
        &self,
        organizer_id: Uuid,
        request: IssueVoucher,
    ) -> Result<Voucher, AppError> {
        let code = normalize_code(&request.code);
        if code.is_empty() {
            return Err(AppError::ValidationError("Voucher code is required".to_string()));
        }
        if !(1..=100).contains(&request.discount_percent) {
            return Err(AppError::ValidationError(
                "Discount percent must be between 1 and 100".to_string(),
            ));
        }
        if request.max_discount.is_some_and(|cap| cap < Decimal::ZERO) {
            return Err(AppError::ValidationError(
                "Maximum discount cannot be negative".to_string(),
            ));
        }
        if request.expires_at <= Utc::now() {
            return Err(AppError::ValidationError(
                "Expiry must be in the future".to_string(),
            ));
        }

        let mut uow = self.store.begin().await?;
        let event = uow
            .lock_event(request.event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", request.event_id)))?;
        if event.organizer_id != organizer_id {
            return Err(AppError::AccessDenied(
                "Only the event organizer can issue vouchers for it".to_string(),
            ));
        }
        if uow.lock_voucher_by_code(&code).await?.is_some() {
            return Err(AppError::ValidationError(format!(
                "Voucher code {code} is already taken"
            )));
        }

        let voucher = uow
            .insert_voucher(NewVoucher {
                code,
                discount_percent: request.discount_percent,
                max_discount: request.max_discount,
                expires_at: request.expires_at,
                event_id: Some(event.id),
                user_id: None,
            })
            .await?;
        uow.commit().await?;

        info!(%organizer_id, event_id = %event.id, code = %voucher.code, "Organizer voucher issued");
        Ok(voucher)
    }

    /// Zeroes balances that have not been credited for three months.
    pub async fn expire_idle_points(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let cutoff = now
            .checked_sub_months(Months::new(POINTS_EXPIRY_MONTHS))
            .unwrap_or(now);
        let count = self.store.expire_idle_points(cutoff).await?;
        if count > 0 {
            info!(count, %cutoff, "Idle point balances expired");
        }
        Ok(count)
    }
}
