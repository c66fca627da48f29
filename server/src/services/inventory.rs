//! Seat reservation against `Event::ticket_sold`.
//!
//! Callers must hold the event row lock (via `UnitOfWork::lock_event`) so the
//! capacity check and the increment are not interleaved with another create.

use uuid::Uuid;

use crate::models::Event;
use crate::store::UnitOfWork;
use crate::utils::error::AppError;

pub fn ensure_capacity(event: &Event, quantity: i32) -> Result<(), AppError> {
    let remaining = event.remaining();
    if remaining < quantity {
        return Err(AppError::insufficient_inventory(quantity, remaining));
    }
    Ok(())
}

pub async fn reserve(
    uow: &mut dyn UnitOfWork,
    event: &Event,
    quantity: i32,
) -> Result<Event, AppError> {
    ensure_capacity(event, quantity)?;
    uow.adjust_ticket_sold(event.id, quantity).await
}

/// Returns seats to the pool. Must run once per terminal transition.
pub async fn release(
    uow: &mut dyn UnitOfWork,
    event_id: Uuid,
    quantity: i32,
) -> Result<Event, AppError> {
    uow.adjust_ticket_sold(event_id, -quantity).await
}
