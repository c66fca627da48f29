//! Payment gateway bridge.
//!
//! The gateway is only called after the creating unit of work has committed,
//! so a failure here never rolls back inventory or loyalty state.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

pub mod midtrans;

pub use midtrans::MidtransGateway;

/// Token and redirect URL handed to the customer to complete payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub token: String,
    pub redirect_url: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid amount {0}")]
    InvalidAmount(Decimal),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a payment session for `order_id`. Calling it again for the same
    /// order must not produce a second charge.
    async fn create_payment_session(
        &self,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<PaymentSession, GatewayError>;
}

/// Development gateway that hands out fake tokens, one per order.
#[derive(Clone, Debug, Default)]
pub struct MockPaymentGateway {
    sessions: Arc<Mutex<HashMap<Uuid, PaymentSession>>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<dyn PaymentGateway> {
        Arc::new(Self::new())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_payment_session(
        &self,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<PaymentSession, GatewayError> {
        if amount <= Decimal::ZERO {
            return Err(GatewayError::InvalidAmount(amount));
        }

        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| GatewayError::Unavailable("mock session table poisoned".into()))?;

        let session = sessions
            .entry(order_id)
            .or_insert_with(|| {
                let token = format!("mock-{}", Uuid::new_v4().simple());
                PaymentSession {
                    redirect_url: format!("https://pay.example.test/snap/{token}"),
                    token,
                }
            })
            .clone();

        tracing::info!(%order_id, %amount, token = %session.token, "Mock payment session issued");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_gateway_is_idempotent_per_order() {
        let gateway = MockPaymentGateway::new();
        let order_id = Uuid::new_v4();

        let first = gateway
            .create_payment_session(order_id, Decimal::from(150_000))
            .await
            .unwrap();
        let second = gateway
            .create_payment_session(order_id, Decimal::from(150_000))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.session_count(), 1);
        assert!(first.redirect_url.ends_with(&first.token));
    }

    #[tokio::test]
    async fn test_mock_gateway_refuses_zero_amount() {
        let gateway = MockPaymentGateway::new();
        let result = gateway
            .create_payment_session(Uuid::new_v4(), Decimal::ZERO)
            .await;
        assert!(matches!(result, Err(GatewayError::InvalidAmount(_))));
    }
}
