//! Voucher discounts and point redemption applied while a transaction is
//! created, and their reversal when it ends without completing.
//!
//! Stacking order is fixed: the voucher percentage applies to the total
//! price, then points are redeemed 1:1 against what is left. Neither step can
//! take the price below zero.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::voucher::normalize_code;
use crate::models::{Transaction, User, Voucher};
use crate::store::UnitOfWork;
use crate::utils::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherDiscount {
    pub voucher_id: Uuid,
    pub discount: Decimal,
    pub final_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsRedemption {
    pub points_used: i64,
    pub final_price: Decimal,
}

/// Percentage discount capped by `max_discount`, never more than `total`.
pub fn voucher_discount(total: Decimal, percent: i32, max_discount: Option<Decimal>) -> Decimal {
    let raw = total * Decimal::from(percent) / Decimal::from(100);
    let capped = match max_discount {
        Some(cap) if raw > cap => cap,
        _ => raw,
    };
    capped.min(total).max(Decimal::ZERO)
}

/// Whole points that can be spent against `price`.
pub fn redeemable_points(price: Decimal, balance: i64) -> i64 {
    let payable = price.floor().to_i64().unwrap_or(i64::MAX).max(0);
    payable.min(balance.max(0))
}

fn check_usable(
    voucher: &Voucher,
    event_id: Uuid,
    buyer_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if voucher.expires_at < now {
        return Err(AppError::VoucherInvalid);
    }
    if voucher.is_used {
        return Err(AppError::VoucherAlreadyUsed);
    }
    if voucher.user_id.is_some_and(|owner| owner != buyer_id) {
        return Err(AppError::VoucherInvalid);
    }
    if voucher.event_id.is_some_and(|scope| scope != event_id) {
        return Err(AppError::VoucherScopeMismatch);
    }
    Ok(())
}

/// Validates `code` for this purchase and prices the discount. The voucher
/// row stays locked; call [`lock_voucher`] once the transaction row exists.
pub async fn apply_voucher(
    uow: &mut dyn UnitOfWork,
    code: &str,
    event_id: Uuid,
    buyer_id: Uuid,
    total_price: Decimal,
    now: DateTime<Utc>,
) -> Result<VoucherDiscount, AppError> {
    let voucher = uow
        .lock_voucher_by_code(&normalize_code(code))
        .await?
        .ok_or(AppError::VoucherInvalid)?;

    check_usable(&voucher, event_id, buyer_id, now)?;

    let discount = voucher_discount(total_price, voucher.discount_percent, voucher.max_discount);
    Ok(VoucherDiscount {
        voucher_id: voucher.id,
        discount,
        final_price: (total_price - discount).max(Decimal::ZERO),
    })
}

pub async fn lock_voucher(uow: &mut dyn UnitOfWork, voucher_id: Uuid) -> Result<(), AppError> {
    uow.set_voucher_used(voucher_id, true).await
}

/// Spends as many of the user's points as the price allows and debits them
/// inside the current unit of work.
pub async fn apply_points(
    uow: &mut dyn UnitOfWork,
    user: &User,
    price: Decimal,
) -> Result<PointsRedemption, AppError> {
    let points_used = redeemable_points(price, user.points);
    if points_used > 0 {
        uow.adjust_points(user.id, -points_used, None).await?;
    }

    Ok(PointsRedemption {
        points_used,
        final_price: (price - Decimal::from(points_used)).max(Decimal::ZERO),
    })
}

/// Adds earned points (referral bonus) and refreshes the expiry clock.
pub async fn credit_points(
    uow: &mut dyn UnitOfWork,
    user_id: Uuid,
    points: i64,
    now: DateTime<Utc>,
) -> Result<User, AppError> {
    uow.adjust_points(user_id, points, Some(now)).await
}

/// Spends a fixed amount of points, failing if the balance is short.
pub async fn spend_points(
    uow: &mut dyn UnitOfWork,
    user: &User,
    points: i64,
) -> Result<User, AppError> {
    if user.points < points {
        return Err(AppError::InsufficientPoints {
            required: points,
            available: user.points,
        });
    }
    uow.adjust_points(user.id, -points, None).await
}

/// Gives back the points and voucher a transaction consumed.
pub async fn restore(
    uow: &mut dyn UnitOfWork,
    transaction: &Transaction,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if transaction.points_used > 0 {
        uow.adjust_points(transaction.user_id, transaction.points_used, Some(now))
            .await?;
    }
    if let Some(voucher_id) = transaction.voucher_id {
        uow.set_voucher_used(voucher_id, false).await?;
    }
    Ok(())
}
